use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use scraper::{Html, Selector};

use crate::error::Error;
use crate::extract::InfoFields;

lazy_static! {
    static ref PROFILE_SELECTOR: Selector = Selector::parse("#profile_top").unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse("#profile_top > b").unwrap();
    static ref AUTHOR_SELECTOR: Selector = Selector::parse("#profile_top > a").unwrap();
    static ref SUMMARY_SELECTOR: Selector = Selector::parse("#profile_top > div").unwrap();
    static ref INFO_SELECTOR: Selector =
        Selector::parse("#profile_top > span.xgray.xcontrast_txt").unwrap();
    static ref COVER_SELECTOR: Selector = Selector::parse("img.lazy.cimage").unwrap();
    static ref CHAPTER_SELECT_SELECTOR: Selector = Selector::parse("select#chap_select").unwrap();
    static ref CHAPTER_OPTION_SELECTOR: Selector = Selector::parse("option").unwrap();
}

/// The normalized profile fields of a story. Every field the site may omit
/// is optional; "absent" and "present and zero" stay distinguishable.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub summary: Option<String>,
    pub rating: Option<String>,
    pub language: Option<String>,
    pub genres: Vec<String>,
    pub characters: Option<String>,
    pub chapter_count: Option<u64>,
    pub word_count: Option<u64>,
    pub review_count: Option<u64>,
    pub favs_count: Option<u64>,
    pub follows_count: Option<u64>,
    pub updated: Option<NaiveDate>,
    pub published: Option<NaiveDate>,
    pub info_id: u64,
    /// Chapter labels in source order, e.g. `"1. The Boy Who Lived"`.
    pub chapters: Vec<String>,
}

/// A scraped story, ready to be bound into a book.
#[derive(Debug, Clone)]
pub struct Story {
    pub title: String,
    pub author: String,
    /// Base URL of the story, ending in a slash; chapter pages live at
    /// `url` joined with the chapter ordinal.
    pub url: Url,
    pub author_url: Option<Url>,
    pub cover_url: Option<Url>,
    pub metadata: Metadata,
}

/// Extracts a [`Story`] from a parsed profile page. Pure function of the
/// document, the id the fetch was initiated with, the base URL, and the
/// reference instant for date resolution.
pub fn scrape_story(
    page: &Html,
    requested_id: u64,
    base: &Url,
    now: DateTime<Utc>,
) -> Result<Story, Error> {
    if page.select(&PROFILE_SELECTOR).next().is_none() {
        // The site serves a profile-less page for ids it does not know.
        return Err(Error::StoryNotFound(requested_id));
    }

    let title = page
        .select(&TITLE_SELECTOR)
        .next()
        .ok_or(Error::MissingElement("#profile_top > b"))?
        .text()
        .collect::<String>()
        .trim()
        .to_string();

    let author_elem = page
        .select(&AUTHOR_SELECTOR)
        .next()
        .ok_or(Error::MissingElement("#profile_top > a"))?;
    let author = author_elem.text().collect::<String>().trim().to_string();
    let author_url = author_elem
        .value()
        .attr("href")
        .and_then(|href| base.join(href).ok());

    let summary = page
        .select(&SUMMARY_SELECTOR)
        .next()
        .map(|elem| elem.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty());

    let info_line = page
        .select(&INFO_SELECTOR)
        .next()
        .map(|elem| elem.text().collect::<String>())
        .unwrap_or_default();
    let fields = InfoFields::from_line(&info_line, now);

    let info_id = fields
        .count("id:")?
        .ok_or_else(|| Error::Field {
            field: "id:".to_string(),
            value: "(absent)".to_string(),
        })?;
    if info_id != requested_id {
        return Err(Error::IdMismatch {
            requested: requested_id,
            parsed: info_id,
        });
    }

    let cover_url = page
        .select(&COVER_SELECTOR)
        .next()
        .and_then(|elem| elem.value().attr("data-original"))
        .and_then(|href| base.join(href).ok());

    let chapters = chapter_labels(page, &title);

    let metadata = Metadata {
        summary,
        rating: fields.text("Rated: Fiction"),
        language: fields.positional(1),
        genres: fields
            .positional(2)
            .map(|genres| genres.split('/').map(|genre| genre.trim().to_string()).collect())
            .unwrap_or_default(),
        characters: fields.positional(3),
        chapter_count: fields.count("Chapters:")?,
        word_count: fields.count("Words:")?,
        review_count: fields.count("Reviews:")?,
        favs_count: fields.count("Favs:")?,
        follows_count: fields.count("Follows:")?,
        updated: fields.date("Updated:")?,
        published: fields.date("Published:")?,
        info_id,
        chapters,
    };

    Ok(Story {
        title,
        author,
        url: base.clone(),
        author_url,
        cover_url,
        metadata,
    })
}

/// The chapter-select labels in page order. A single-chapter story has no
/// select at all; its one chapter is synthesized from the story title.
fn chapter_labels(page: &Html, title: &str) -> Vec<String> {
    let labels: Vec<String> = page
        .select(&CHAPTER_SELECT_SELECTOR)
        .next()
        .map(|select| {
            select
                .select(&CHAPTER_OPTION_SELECTOR)
                .map(|option| option.text().collect::<String>().trim().to_string())
                .collect()
        })
        .unwrap_or_default();
    if labels.is_empty() {
        vec![format!("1. {}", title)]
    } else {
        labels
    }
}

#[cfg(test)]
use chrono::TimeZone;

#[cfg(test)]
fn profile_page(info_line: &str, chapter_select: &str, cover: &str) -> Html {
    Html::parse_document(&format!(
        "<html><body>\
         <div id='profile_top'>\
         <b class='xcontrast_txt'>The Long Game</b>\
         <a class='xcontrast_txt' href='/u/999/someone'>Someone</a>\
         <div class='xcontrast_txt'>A summary of sorts.</div>\
         <span class='xgray xcontrast_txt'>{}</span>\
         </div>{}{}\
         </body></html>",
        info_line, cover, chapter_select,
    ))
}

#[cfg(test)]
fn reference_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

#[cfg(test)]
const INFO_LINE: &str = "Rated: Fiction K+ - English - Adventure/Friendship - Harry P. - \
     Chapters: 2 - Words: 12,345 - Reviews: 67 - Favs: 89 - Follows: 10 - \
     Updated: 4/5 - Published: 1/2/2016 - id: 12345";

#[test]
fn test_scrapes_the_whole_profile() {
    let page = profile_page(
        INFO_LINE,
        "<select id='chap_select'>\
         <option value='1'>1. One</option><option value='2'>2. Two</option>\
         </select>",
        "<img class='lazy cimage' src='spacer.gif' data-original='/image/42/180/'/>",
    );
    let base = Url::parse("https://www.fanfiction.net/s/12345/").unwrap();
    let story = scrape_story(&page, 12345, &base, reference_instant()).unwrap();

    assert_eq!("The Long Game", story.title);
    assert_eq!("Someone", story.author);
    assert_eq!(
        "https://www.fanfiction.net/u/999/someone",
        story.author_url.as_ref().unwrap().as_str()
    );
    assert_eq!(
        "https://www.fanfiction.net/image/42/180/",
        story.cover_url.as_ref().unwrap().as_str()
    );

    let m = &story.metadata;
    assert_eq!(Some("A summary of sorts.".to_string()), m.summary);
    assert_eq!(Some("K+".to_string()), m.rating);
    assert_eq!(Some("English".to_string()), m.language);
    assert_eq!(vec!["Adventure".to_string(), "Friendship".to_string()], m.genres);
    assert_eq!(Some("Harry P.".to_string()), m.characters);
    assert_eq!(Some(2), m.chapter_count);
    assert_eq!(Some(12_345), m.word_count);
    assert_eq!(Some(67), m.review_count);
    assert_eq!(Some(89), m.favs_count);
    assert_eq!(Some(10), m.follows_count);
    assert_eq!(Some(NaiveDate::from_ymd_opt(2024, 4, 5).unwrap()), m.updated);
    assert_eq!(Some(NaiveDate::from_ymd_opt(2016, 1, 2).unwrap()), m.published);
    assert_eq!(12345, m.info_id);
    assert_eq!(vec!["1. One".to_string(), "2. Two".to_string()], m.chapters);
}

#[test]
fn test_id_mismatch_aborts_construction() {
    let page = profile_page(INFO_LINE, "", "");
    let base = Url::parse("https://www.fanfiction.net/s/54321/").unwrap();
    match scrape_story(&page, 54321, &base, reference_instant()) {
        Err(Error::IdMismatch { requested, parsed }) => {
            assert_eq!(54321, requested);
            assert_eq!(12345, parsed);
        }
        other => panic!("expected an id mismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_chapter_select_synthesizes_one_chapter() {
    let page = profile_page(INFO_LINE, "", "");
    let base = Url::parse("https://www.fanfiction.net/s/12345/").unwrap();
    let story = scrape_story(&page, 12345, &base, reference_instant()).unwrap();
    assert_eq!(vec!["1. The Long Game".to_string()], story.metadata.chapters);
    assert!(story.cover_url.is_none());
}

#[test]
fn test_missing_profile_means_no_story() {
    let page = Html::parse_document("<html><body><p>Story Not Found</p></body></html>");
    let base = Url::parse("https://www.fanfiction.net/s/12345/").unwrap();
    match scrape_story(&page, 12345, &base, reference_instant()) {
        Err(Error::StoryNotFound(id)) => assert_eq!(12345, id),
        other => panic!("expected story-not-found, got {:?}", other.map(|_| ())),
    }
}
