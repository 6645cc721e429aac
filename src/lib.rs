//! Downloads a story from fanfiction.net and assembles it into an EPUB 2 or
//! EPUB 3 package: cover, title page, info page, a table of contents that
//! knows not to list itself, and one document per chapter.
//!
//! The two entry points mirror each other: [`fetch`] scrapes a story's
//! profile into a [`Story`], and [`Story::bind`] (or [`get`], which chains
//! the two) assembles the finished book.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate html5ever;

pub mod book;
pub mod chapter;
pub mod client;
mod dom;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod flaresolverr;
pub mod image;
pub mod render;
pub mod story;

pub use crate::book::{BindOptions, Progress, Version};
pub use crate::client::Transport;
pub use crate::error::Error;
pub use crate::flaresolverr::FlareSolverr;
pub use crate::story::{Metadata, Story};

use chrono::Utc;
use epub_builder::{EpubBuilder, ZipLibrary};
use regex::Regex;
use reqwest::Url;

lazy_static! {
    static ref STORY_URL_REGEX: Regex = Regex::new(r"(?i)fanfiction\.net/s/(\d+)").unwrap();
}

/// Derives the numeric story id from a story URL or a bare id string.
/// Anything else is an input error; there is no way to guess what page the
/// caller meant.
pub fn story_id(target: &str) -> Result<u64, Error> {
    let bad_ref = || Error::StoryRef(target.to_string());
    if let Some(captures) = STORY_URL_REGEX.captures(target) {
        return captures[1].parse().map_err(|_| bad_ref());
    }
    target.trim().parse().map_err(|_| bad_ref())
}

/// Fetches and scrapes a story's profile page. The reference instant for
/// date normalization is taken once, here, so every field of the returned
/// story agrees on what "now" meant.
pub fn fetch(transport: &Transport, target: &str) -> Result<Story, Error> {
    let id = story_id(target)?;
    let base = Url::parse(&format!("https://www.fanfiction.net/s/{}/", id))
        .map_err(|e| Error::InvalidUrl(format!("story {}: {}", id, e)))?;
    let page = transport.fetch_document(&base)?;
    story::scrape_story(&page, id, &base, Utc::now())
}

/// Fetches a story and binds it into a book in one call.
pub fn get(
    transport: &Transport,
    target: &str,
    opts: &BindOptions,
) -> Result<EpubBuilder<ZipLibrary>, Error> {
    fetch(transport, target)?.bind(transport, opts, None)
}

#[test]
fn test_story_id_from_url() {
    assert_eq!(
        12345,
        story_id("https://www.fanfiction.net/s/12345/3/Some-Story").unwrap()
    );
    assert_eq!(12345, story_id("https://m.FanFiction.net/s/12345").unwrap());
}

#[test]
fn test_story_id_from_bare_id() {
    assert_eq!(12345, story_id("12345").unwrap());
    assert_eq!(12345, story_id(" 12345 ").unwrap());
}

#[test]
fn test_story_id_rejects_everything_else() {
    for target in ["banana", "https://example.com/s/12345/", ""] {
        match story_id(target) {
            Err(Error::StoryRef(echoed)) => assert_eq!(target, echoed),
            other => panic!("expected a story-ref error for {:?}, got {:?}", target, other),
        }
    }
}
