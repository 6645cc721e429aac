use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ReferenceType, ZipLibrary};
use html_escape::encode_text;

use crate::chapter::{self, Chapter};
use crate::client::Transport;
use crate::error::Error;
use crate::image::MediaType;
use crate::render;
use crate::story::Story;

/// Target container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V2,
    V3,
}

impl Version {
    pub fn doctype(self) -> &'static str {
        match self {
            Version::V3 => "<!DOCTYPE html>",
            Version::V2 => {
                "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \
                 \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">"
            }
        }
    }

    fn epub_version(self) -> EpubVersion {
        match self {
            Version::V2 => EpubVersion::V20,
            Version::V3 => EpubVersion::V30,
        }
    }
}

/// Knobs for [`Story::bind`].
#[derive(Debug, Clone)]
pub struct BindOptions {
    pub version: Version,
    /// Fetch and embed the cover image when the story has one.
    pub include_cover: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        BindOptions {
            version: Version::V3,
            include_cover: true,
        }
    }
}

/// Invoked after each chapter is embedded with the chapter's source ordinal
/// and the total chapter count. Called synchronously; a slow callback stalls
/// the whole assembly.
pub type Progress<'a> = &'a mut dyn FnMut(u32, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    CoverPage,
    TitlePage,
    InfoPage,
    TocPage,
    Chapter,
}

/// One named, ordered, content-bearing unit of the draft. Items are
/// append-only; after emission only the dedicated resequencing step touches
/// them (TOC placeholder content, navigation label prefixes).
#[derive(Debug)]
struct Item {
    path: String,
    content: String,
    label: Option<String>,
    kind: ItemKind,
}

/// A navigation entry: where a labelled item lives and what the reader's
/// table of contents calls it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NavEntry {
    href: String,
    label: String,
}

#[derive(Debug, Default)]
struct Draft {
    items: Vec<Item>,
}

impl Draft {
    fn push(&mut self, kind: ItemKind, path: &str, content: String, label: Option<String>) {
        self.items.push(Item {
            path: path.to_string(),
            content,
            label,
            kind,
        });
    }

    fn push_chapter(&mut self, chapter: &Chapter, body: &str, version: Version) {
        self.push(
            ItemKind::Chapter,
            &format!("text/chapter{:03}.xhtml", chapter.ordinal),
            chapter_page(version, chapter, body),
            Some(chapter.title.clone()),
        );
    }

    /// Count of labelled front-matter entries the TOC page must not list:
    /// the cover page (when present), the info page, and the TOC placeholder
    /// itself. The unlabelled title page never enters the navigation.
    fn cut_index(&self) -> usize {
        self.items
            .iter()
            .take_while(|item| item.kind != ItemKind::Chapter)
            .filter(|item| item.label.is_some())
            .count()
    }

    /// Value-copy of the navigation entries as they stand right now.
    fn nav_entries(&self) -> Vec<NavEntry> {
        self.items
            .iter()
            .filter_map(|item| {
                item.label.as_ref().map(|label| NavEntry {
                    href: item.path.clone(),
                    label: label.clone(),
                })
            })
            .collect()
    }

    /// The two-pass navigation fix-up. The TOC page's content depends on the
    /// final shape of the book it sits inside, so it is materialized last,
    /// from a snapshot of the entries with the front matter cut off: the
    /// page must not list the cover, the info page, or itself. The live
    /// entries then get their display labels prefixed with each chapter's
    /// 1-based position, independent of the source's own numbering.
    ///
    /// A single-chapter book has no TOC placeholder and skips all of this.
    fn resequence(&mut self, version: Version) {
        let toc_index = match self.items.iter().position(|item| item.kind == ItemKind::TocPage) {
            Some(index) => index,
            None => return,
        };
        let cut = self.cut_index();
        let entries = self.nav_entries();
        self.items[toc_index].content = toc_page(version, &entries[cut..]);

        let mut position = 0;
        for item in &mut self.items {
            if item.kind != ItemKind::Chapter {
                continue;
            }
            if let Some(label) = item.label.take() {
                position += 1;
                item.label = Some(format!("{}. {}", position, label));
            }
        }
    }
}

impl Story {
    /// Assembles the story into an EPUB builder: fetches the cover and every
    /// chapter, emits the items in reading order, resequences the
    /// navigation, and hands the result to the container writer. The caller
    /// serializes the builder wherever it wants the package.
    pub fn bind(
        &self,
        transport: &Transport,
        opts: &BindOptions,
        mut progress: Option<Progress>,
    ) -> Result<EpubBuilder<ZipLibrary>, Error> {
        let version = opts.version;

        let cover = match (&self.cover_url, opts.include_cover) {
            (Some(url), true) => {
                let bytes = transport.fetch_bytes(url, Some(&self.url))?;
                let media = MediaType::sniff(&bytes)
                    .ok_or_else(|| Error::UnsupportedImage(url.to_string()))?;
                Some((media, bytes))
            }
            _ => None,
        };

        let mut draft = front_matter(self, version, cover.as_ref().map(|(media, _)| *media));
        let total = self.metadata.chapters.len();
        for label in &self.metadata.chapters {
            let chapter = Chapter::parse(label)?;
            let body = chapter::fetch_content(transport, &self.url, &chapter)?;
            draft.push_chapter(&chapter, &body, version);
            if let Some(ref mut callback) = progress {
                callback(chapter.ordinal, total);
            }
        }
        draft.resequence(version);

        self.into_builder(draft, version, cover)
    }

    fn into_builder(
        &self,
        draft: Draft,
        version: Version,
        cover: Option<(MediaType, Vec<u8>)>,
    ) -> Result<EpubBuilder<ZipLibrary>, Error> {
        let mut builder = EpubBuilder::new(ZipLibrary::new()?)?;
        builder.epub_version(version.epub_version());
        builder.metadata("title", &self.title)?;
        builder.metadata("author", &self.author)?;
        builder.metadata(
            "lang",
            language_code(self.metadata.language.as_deref().unwrap_or("")),
        )?;
        if let Some(summary) = &self.metadata.summary {
            builder.metadata("description", summary)?;
        }
        if let Some((media, bytes)) = &cover {
            builder.add_cover_image(
                format!("img/cover_image.{}", media.extension()),
                bytes.as_slice(),
                media.content_type(),
            )?;
        }
        for item in draft.items {
            let mut content = EpubContent::new(item.path, item.content.as_bytes())
                .reftype(reference_type(item.kind));
            if let Some(label) = &item.label {
                // Titles here should not need to be escaped but unfortunately,
                // without this the nav.xhtml will contain unescaped &.
                // And escaping it ourselves double-escapes it in toc.ncx, so
                // swap in the small-ampersand character instead.
                // https://github.com/lise-henry/epub-builder/pull/41
                content = content.title(label.replace('&', "﹠"));
            }
            builder.add_content(content)?;
        }
        Ok(builder)
    }
}

/// Emits the front matter that exists, in fixed order: cover page (only
/// when a cover image was obtained), title page, info page, and the
/// still-empty TOC placeholder. A one-entry table of contents adds nothing,
/// so single-chapter stories never get the placeholder.
fn front_matter(story: &Story, version: Version, cover: Option<MediaType>) -> Draft {
    let mut draft = Draft::default();
    if let Some(media) = cover {
        draft.push(
            ItemKind::CoverPage,
            "img/coverpage.xhtml",
            cover_page(version, media),
            Some(story.title.clone()),
        );
    }
    draft.push(
        ItemKind::TitlePage,
        "text/titlepage.xhtml",
        title_page(version, &story.title, &story.author),
        None,
    );
    draft.push(
        ItemKind::InfoPage,
        "text/infopage.xhtml",
        render::infopage(story, version),
        Some("About".to_string()),
    );
    if story.metadata.chapters.len() > 1 {
        draft.push(
            ItemKind::TocPage,
            "text/toc.xhtml",
            String::new(),
            Some("Table of Contents".to_string()),
        );
    }
    draft
}

fn reference_type(kind: ItemKind) -> ReferenceType {
    match kind {
        ItemKind::CoverPage => ReferenceType::Cover,
        ItemKind::TitlePage => ReferenceType::TitlePage,
        ItemKind::InfoPage => ReferenceType::Preface,
        ItemKind::TocPage => ReferenceType::Toc,
        ItemKind::Chapter => ReferenceType::Text,
    }
}

/// The visible table-of-contents page, listing the given (post-cut) entries
/// with their 1-based positions. Entry hrefs are stored book-relative;
/// the page lives in `text/`, so links are rebased to it.
fn toc_page(version: Version, entries: &[NavEntry]) -> String {
    let mut list = String::new();
    for (index, entry) in entries.iter().enumerate() {
        list.push_str(&format!(
            "        <li><a href=\"{}\">{}. {}</a></li>\n",
            toc_relative_href(&entry.href),
            index + 1,
            encode_text(&entry.label),
        ));
    }
    let body = match version {
        Version::V3 => format!(
            "    <nav epub:type=\"toc\">\n\
             \x20     <h1>Table of Contents</h1>\n\
             \x20     <ol>\n\
             {}      </ol>\n\
             \x20   </nav>\n",
            list
        ),
        Version::V2 => format!(
            "    <h1>Table of Contents</h1>\n\
             \x20   <ul>\n\
             {}    </ul>\n",
            list
        ),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         {doctype}\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"{epub_ns} xml:lang=\"en\">\n\
         \x20 <head>\n\
         \x20   <meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\"/>\n\
         \x20   <title>Table of Contents</title>\n\
         \x20 </head>\n\
         \x20 <body>\n\
         {body}  </body>\n\
         </html>\n",
        doctype = version.doctype(),
        epub_ns = epub_namespace(version),
        body = body,
    )
}

fn toc_relative_href(href: &str) -> String {
    match href.strip_prefix("text/") {
        Some(rest) => rest.to_string(),
        None => format!("../{}", href),
    }
}

fn epub_namespace(version: Version) -> &'static str {
    match version {
        Version::V3 => " xmlns:epub=\"http://www.idpf.org/2007/ops\"",
        Version::V2 => "",
    }
}

fn cover_page(version: Version, media: MediaType) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         {doctype}\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"en\">\n\
         \x20 <head>\n\
         \x20   <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\"/>\n\
         \x20   <title>Cover</title>\n\
         \x20   <style type=\"text/css\" title=\"override_css\">\n\
         \x20     @page {{ padding: 0pt; margin: 0pt }}\n\
         \x20     body {{ text-align: center; padding: 0pt; margin: 0pt; }}\n\
         \x20   </style>\n\
         \x20 </head>\n\
         \x20 <body>\n\
         \x20   <div style=\"text-align: center;\">\n\
         \x20     <svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" version=\"1.1\"\n\
         \x20          width=\"100%\" height=\"100%\" preserveAspectRatio=\"xMidYMid meet\">\n\
         \x20       <image width=\"100%\" height=\"100%\" xlink:href=\"cover_image.{extension}\"></image>\n\
         \x20     </svg>\n\
         \x20   </div>\n\
         \x20 </body>\n\
         </html>\n",
        doctype = version.doctype(),
        extension = media.extension(),
    )
}

fn title_page(version: Version, title: &str, author: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         {doctype}\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"en\">\n\
         \x20 <head>\n\
         \x20   <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\"/>\n\
         \x20   <title>{title}</title>\n\
         \x20   <style type=\"text/css\" title=\"override_css\">\n\
         \x20     .outer {{ display: table; height: 75%; width: 100%; }}\n\
         \x20     .middle {{ display: table-cell; vertical-align: middle; }}\n\
         \x20     .inner {{ text-align: center; }}\n\
         \x20   </style>\n\
         \x20 </head>\n\
         \x20 <body>\n\
         \x20   <div class=\"outer\"><div class=\"middle\"><div class=\"inner\">\n\
         \x20     <h1>{title}</h1>\n\
         \x20     <h3>{author}</h3>\n\
         \x20   </div></div></div>\n\
         \x20 </body>\n\
         </html>\n",
        doctype = version.doctype(),
        title = encode_text(title),
        author = encode_text(author),
    )
}

fn chapter_page(version: Version, chapter: &Chapter, body: &str) -> String {
    let (section_open, section_close) = match version {
        Version::V3 => ("    <section epub:type=\"chapter\">\n", "    </section>\n"),
        Version::V2 => ("", ""),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         {doctype}\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"{epub_ns} xml:lang=\"en\">\n\
         \x20 <head>\n\
         \x20   <title>c{ordinal}</title>\n\
         \x20   <meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\"/>\n\
         \x20 </head>\n\
         \x20 <body>\n\
         {section_open}    <h1 style=\"text-align:center\">{title}</h1>\n\
         {body}\n\
         {section_close}  </body>\n\
         </html>\n",
        doctype = version.doctype(),
        epub_ns = epub_namespace(version),
        ordinal = chapter.ordinal,
        title = encode_text(&chapter.title),
        body = body,
        section_open = section_open,
        section_close = section_close,
    )
}

/// Maps the profile's language name onto the package `lang` code. The site
/// offers a fixed list; anything unknown falls back to English.
fn language_code(name: &str) -> &'static str {
    match name.to_lowercase().as_str() {
        "english" => "en",
        "spanish" => "es",
        "french" => "fr",
        "german" => "de",
        "italian" => "it",
        "portuguese" => "pt",
        "dutch" => "nl",
        "polish" => "pl",
        "russian" => "ru",
        "indonesian" => "id",
        "chinese" => "zh",
        "japanese" => "ja",
        "korean" => "ko",
        "turkish" => "tr",
        "swedish" => "sv",
        "danish" => "da",
        "czech" => "cs",
        "finnish" => "fi",
        "hungarian" => "hu",
        "vietnamese" => "vi",
        _ => "en",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::Metadata;
    use reqwest::Url;

    fn sample_story(chapter_count: usize) -> Story {
        let chapters = (1..=chapter_count)
            .map(|n| format!("{}. Part {}", n, n))
            .collect();
        Story {
            title: "The Long Game".to_string(),
            author: "Someone".to_string(),
            url: Url::parse("https://www.fanfiction.net/s/12345/").unwrap(),
            author_url: None,
            cover_url: None,
            metadata: Metadata {
                info_id: 12345,
                chapters,
                ..Metadata::default()
            },
        }
    }

    fn assembled(chapter_count: usize, cover: Option<MediaType>, version: Version) -> Draft {
        let story = sample_story(chapter_count);
        let mut draft = front_matter(&story, version, cover);
        for label in &story.metadata.chapters {
            let chapter = Chapter::parse(label).unwrap();
            draft.push_chapter(&chapter, "<p>words</p>", version);
        }
        draft.resequence(version);
        draft
    }

    #[test]
    fn test_item_order_with_cover_and_five_chapters() {
        let draft = assembled(5, Some(MediaType::Jpeg), Version::V3);
        let paths: Vec<&str> = draft.items.iter().map(|item| item.path.as_str()).collect();
        assert_eq!(
            vec![
                "img/coverpage.xhtml",
                "text/titlepage.xhtml",
                "text/infopage.xhtml",
                "text/toc.xhtml",
                "text/chapter001.xhtml",
                "text/chapter002.xhtml",
                "text/chapter003.xhtml",
                "text/chapter004.xhtml",
                "text/chapter005.xhtml",
            ],
            paths
        );
    }

    #[test]
    fn test_cut_index_counts_labelled_front_matter() {
        assert_eq!(3, assembled(5, Some(MediaType::Jpeg), Version::V3).cut_index());
        assert_eq!(2, assembled(5, None, Version::V3).cut_index());
    }

    #[test]
    fn test_toc_page_lists_only_chapters_with_positions() {
        let draft = assembled(5, Some(MediaType::Jpeg), Version::V3);
        let toc = &draft.items[3];
        assert_eq!(ItemKind::TocPage, toc.kind);
        for n in 1..=5 {
            let line = format!(
                "<li><a href=\"chapter{:03}.xhtml\">{}. Part {}</a></li>",
                n, n, n
            );
            assert!(toc.content.contains(&line), "missing {:?} in {}", line, toc.content);
        }
        assert!(!toc.content.contains("About"));
        assert!(!toc.content.contains("coverpage"));
        assert!(!toc.content.contains("titlepage"));
    }

    #[test]
    fn test_live_chapter_labels_get_position_prefixes() {
        let draft = assembled(5, None, Version::V3);
        let labels: Vec<&str> = draft
            .items
            .iter()
            .filter(|item| item.kind == ItemKind::Chapter)
            .map(|item| item.label.as_deref().unwrap())
            .collect();
        assert_eq!(
            vec!["1. Part 1", "2. Part 2", "3. Part 3", "4. Part 4", "5. Part 5"],
            labels
        );
        // Front matter labels are left alone.
        assert_eq!(Some("About"), draft.items[1].label.as_deref());
    }

    #[test]
    fn test_positions_ignore_source_numbering_gaps() {
        let mut draft = front_matter(&sample_story(2), Version::V3, None);
        for label in ["3. Three", "7. Seven"] {
            let chapter = Chapter::parse(label).unwrap();
            draft.push_chapter(&chapter, "<p>words</p>", Version::V3);
        }
        draft.resequence(Version::V3);
        let labels: Vec<&str> = draft
            .items
            .iter()
            .filter(|item| item.kind == ItemKind::Chapter)
            .map(|item| item.label.as_deref().unwrap())
            .collect();
        assert_eq!(vec!["1. Three", "2. Seven"], labels);
        let toc = draft.items.iter().find(|i| i.kind == ItemKind::TocPage).unwrap();
        assert!(toc.content.contains("<a href=\"chapter003.xhtml\">1. Three</a>"));
        assert!(toc.content.contains("<a href=\"chapter007.xhtml\">2. Seven</a>"));
    }

    #[test]
    fn test_single_chapter_has_no_toc_and_no_prefix() {
        let draft = assembled(1, None, Version::V3);
        assert!(draft.items.iter().all(|item| item.kind != ItemKind::TocPage));
        let chapter = draft
            .items
            .iter()
            .find(|item| item.kind == ItemKind::Chapter)
            .unwrap();
        assert_eq!(Some("Part 1"), chapter.label.as_deref());
    }

    #[test]
    fn test_resequencing_with_no_front_matter_only_adds_prefixes() {
        let entries = vec![
            NavEntry {
                href: "text/chapter001.xhtml".to_string(),
                label: "Alpha".to_string(),
            },
            NavEntry {
                href: "text/chapter002.xhtml".to_string(),
                label: "Beta".to_string(),
            },
        ];
        let page = toc_page(Version::V3, &entries);
        assert!(page.contains("<a href=\"chapter001.xhtml\">1. Alpha</a>"));
        assert!(page.contains("<a href=\"chapter002.xhtml\">2. Beta</a>"));
    }

    #[test]
    fn test_toc_hrefs_leave_the_directory_when_needed() {
        assert_eq!("chapter001.xhtml", toc_relative_href("text/chapter001.xhtml"));
        assert_eq!("../img/coverpage.xhtml", toc_relative_href("img/coverpage.xhtml"));
    }

    #[test]
    fn test_version_two_has_no_epub_namespace() {
        let draft = assembled(2, None, Version::V2);
        let chapter = draft
            .items
            .iter()
            .find(|item| item.kind == ItemKind::Chapter)
            .unwrap();
        assert!(!chapter.content.contains("epub:type"));
        assert!(chapter.content.contains("XHTML 1.1"));
        let toc = draft.items.iter().find(|i| i.kind == ItemKind::TocPage).unwrap();
        assert!(toc.content.contains("<ul>"));
    }

    #[test]
    fn test_chapter_page_wraps_body_for_version_three() {
        let chapter = Chapter::parse("2. Homecoming & After").unwrap();
        let page = chapter_page(Version::V3, &chapter, "<p>body</p>");
        assert!(page.contains("<section epub:type=\"chapter\">"));
        assert!(page.contains("<title>c2</title>"));
        assert!(page.contains("Homecoming &amp; After"));
        assert!(page.contains("<p>body</p>"));
    }

    #[test]
    fn test_language_codes() {
        assert_eq!("en", language_code("English"));
        assert_eq!("es", language_code("Spanish"));
        assert_eq!("en", language_code("Klingon"));
    }
}
