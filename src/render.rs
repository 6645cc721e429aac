use html_escape::encode_text;

use crate::book::Version;
use crate::story::Story;

/// Renders the info ("About") page from the normalized field set. Pure
/// markup generation; fields the profile did not carry are simply omitted.
pub fn infopage(story: &Story, version: Version) -> String {
    let m = &story.metadata;
    let mut body = String::new();

    let author = encode_text(&story.author).into_owned();
    match &story.author_url {
        Some(url) => body.push_str(&format!(
            "    <p><strong>Author: </strong><a href=\"{}\">{}</a></p>\n",
            url, author
        )),
        None => body.push_str(&format!("    <p><strong>Author: </strong>{}</p>\n", author)),
    }
    if let Some(summary) = &m.summary {
        body.push_str(&format!(
            "    <p><strong>Summary:</strong><br/>{}</p>\n",
            encode_text(summary)
        ));
    }

    let mut line = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            body.push_str(&format!(
                "    <span><strong>{}:</strong> {}<br/></span>\n",
                name, value
            ));
        }
    };
    line("Rating", m.rating.as_deref().map(escaped));
    line("Language", m.language.as_deref().map(escaped));
    line(
        "Genres",
        if m.genres.is_empty() {
            None
        } else {
            Some(escaped(&m.genres.join(", ")))
        },
    );
    line("Characters/Pairings", m.characters.as_deref().map(escaped));
    line("Chapter count", m.chapter_count.map(format_count));
    line("Word count", m.word_count.map(format_count));
    line(
        "Reviews",
        m.review_count.map(|count| {
            format!(
                "<a href=\"https://www.fanfiction.net/r/{}/\">{}</a>",
                m.info_id,
                format_count(count)
            )
        }),
    );
    line("Favorites", m.favs_count.map(format_count));
    line("Follows", m.follows_count.map(format_count));
    line("Updated", m.updated.map(|date| date.to_string()));
    line("Published", m.published.map(|date| date.to_string()));
    line("ID", Some(m.info_id.to_string()));

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         {doctype}\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xml:lang=\"en\">\n\
         \x20 <head>\n\
         \x20   <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\"/>\n\
         \x20   <title>About</title>\n\
         \x20 </head>\n\
         \x20 <body>\n\
         {body}  </body>\n\
         </html>\n",
        doctype = version.doctype(),
        body = body,
    )
}

fn escaped(value: &str) -> String {
    encode_text(value).into_owned()
}

/// `1234567` renders as `1,234,567`.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

#[cfg(test)]
use crate::story::Metadata;
#[cfg(test)]
use reqwest::Url;

#[test]
fn test_format_count_groups_thousands() {
    assert_eq!("0", format_count(0));
    assert_eq!("999", format_count(999));
    assert_eq!("1,000", format_count(1_000));
    assert_eq!("1,234,567", format_count(1_234_567));
}

#[cfg(test)]
fn sample_story() -> Story {
    Story {
        title: "War & Peace".to_string(),
        author: "Lev <Leo>".to_string(),
        url: Url::parse("https://www.fanfiction.net/s/12345/").unwrap(),
        author_url: Some(Url::parse("https://www.fanfiction.net/u/999/lev").unwrap()),
        cover_url: None,
        metadata: Metadata {
            summary: Some("Everything > everyone.".to_string()),
            rating: Some("K+".to_string()),
            language: Some("English".to_string()),
            genres: vec!["Drama".to_string(), "Adventure".to_string()],
            characters: None,
            chapter_count: Some(2),
            word_count: Some(12_345),
            review_count: Some(1_234),
            favs_count: None,
            follows_count: None,
            updated: None,
            published: None,
            info_id: 12345,
            chapters: vec!["1. One".to_string(), "2. Two".to_string()],
        },
    }
}

#[test]
fn test_infopage_renders_present_fields_only() {
    let page = infopage(&sample_story(), Version::V3);
    assert!(page.contains("<title>About</title>"));
    assert!(page.contains("https://www.fanfiction.net/u/999/lev"));
    assert!(page.contains("Lev &lt;Leo&gt;"));
    assert!(page.contains("Everything &gt; everyone."));
    assert!(page.contains("Drama, Adventure"));
    assert!(page.contains("12,345"));
    assert!(page.contains("<a href=\"https://www.fanfiction.net/r/12345/\">1,234</a>"));
    assert!(!page.contains("Favorites"));
    assert!(!page.contains("Updated"));
    assert!(!page.contains("Characters"));
}

#[test]
fn test_infopage_carries_the_version_doctype() {
    assert!(infopage(&sample_story(), Version::V3).contains("<!DOCTYPE html>\n"));
    assert!(infopage(&sample_story(), Version::V2).contains("XHTML 1.1"));
}
