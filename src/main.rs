use std::fs::File;
use std::path::PathBuf;

use directories::ProjectDirs;
use structopt::StructOpt;

use fanrip::{BindOptions, Error, FlareSolverr, Transport, Version};

/// Downloads stories from fanfiction.net and converts them to EPUB format.
#[derive(StructOpt)]
struct Args {
    /// Story ids or story URLs to download
    #[structopt(required = true)]
    stories: Vec<String>,
    /// Produce EPUB 2 packages instead of EPUB 3
    #[structopt(short = "2", long)]
    epub2: bool,
    /// Skip the cover image even when the story has one
    #[structopt(short, long)]
    no_cover: bool,
    /// Directory the finished EPUBs are written into
    #[structopt(short, long, default_value = ".")]
    output: PathBuf,
    /// Port of a running FlareSolverr instance, for when the site hides
    /// behind an anti-bot challenge
    #[structopt(long)]
    solver_port: Option<u16>,
    /// Do not cache fetched pages on disk
    #[structopt(long)]
    no_cache: bool,
}

fn main() -> Result<(), Error> {
    interpret_args()
}

fn interpret_args() -> Result<(), Error> {
    let args = Args::from_args();

    let proj_dirs = ProjectDirs::from("net", "fanrip", "fanrip");
    let cache_dir = if args.no_cache {
        None
    } else {
        proj_dirs.as_ref().map(|dirs| dirs.cache_dir().to_path_buf())
    };
    if let Some(cache_path) = &cache_dir {
        println!("Using cache directory: {:?}", cache_path);
    }

    let mut transport = Transport::new(cache_dir)?;
    if let Some(port) = args.solver_port {
        println!("Routing page fetches through FlareSolverr on port {}", port);
        transport = transport.with_solver(FlareSolverr::new(port));
    }

    let opts = BindOptions {
        version: if args.epub2 { Version::V2 } else { Version::V3 },
        include_cover: !args.no_cover,
    };

    for target in &args.stories {
        let story = fanrip::fetch(&transport, target)?;
        println!("Downloading {} by {}", story.title, story.author);

        let mut progress = |ordinal: u32, total: usize| {
            println!("Embedded chapter {} of {}", ordinal, total);
        };
        let mut builder = story.bind(&transport, &opts, Some(&mut progress))?;

        let path = args.output.join(format!("{}.epub", file_stem(&story.title)));
        let mut file = File::create(&path)?;
        builder.generate(&mut file)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

/// A filename-safe rendition of the story title.
fn file_stem(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[test]
fn test_file_stem_is_filename_safe() {
    assert_eq!("the_long_game", file_stem("The Long Game"));
    assert_eq!("a_b_c", file_stem("A/B: C?"));
}
