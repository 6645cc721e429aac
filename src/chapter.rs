use regex::{Captures, Regex};
use reqwest::Url;
use scraper::{Html, Node, Selector};

use crate::client::Transport;
use crate::dom::{html_attr_name, AttributeStrip, MutableDom, XmlSerializable};
use crate::error::Error;

lazy_static! {
    // Leading chapter number, an optional separator, then the title.
    static ref CHAPTER_LABEL_REGEX: Regex = Regex::new(r"^(\d+)\s*[-.)]?\s*(.*)$").unwrap();
    static ref STORYTEXT_SELECTOR: Selector = Selector::parse("#storytext").unwrap();
}

// Cloudflare mangles anything even vaguely resembling an email into a string
// that's decoded by javascript on the client. For example, 'Point_Me_@_The_Sky'
// turns into:
//   '<a href="/cdn-cgi/l/email-protection" class="__cf_email__" data-cfemail="...">[email&nbsp;protected]</a>_The_Sky'
// The fragment is decoded back before it is embedded.
lazy_static! {
    static ref CLOUDFLARE_EMAIL_REGEX: Regex = Regex::new(
        r#"<a href="/cdn-cgi/l/email-protection" class="__cf_email__" data-cfemail="([^"]+)">\[email.*?protected\]</a>"#,
    ).unwrap();
}

/// One chapter of a story: the source-assigned ordinal (1-based, not
/// necessarily contiguous) and its title, both taken from a chapter-list
/// label such as `"12. Some Title"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub ordinal: u32,
    pub title: String,
}

impl Chapter {
    /// Splits a chapter label into ordinal and title. A label without a
    /// leading number leaves no way to locate the chapter page, so it is a
    /// fatal input error rather than something to guess around.
    pub fn parse(label: &str) -> Result<Self, Error> {
        let bad_label = || Error::ChapterLabel(label.to_string());
        let captures = CHAPTER_LABEL_REGEX
            .captures(label.trim())
            .ok_or_else(bad_label)?;
        let ordinal = captures[1].parse().map_err(|_| bad_label())?;
        Ok(Chapter {
            ordinal,
            title: captures[2].trim().to_string(),
        })
    }
}

/// Fetches a chapter's page and returns its sanitized story text. The
/// chapter page lives at the story's base URL joined with the ordinal.
pub fn fetch_content(transport: &Transport, base: &Url, chapter: &Chapter) -> Result<String, Error> {
    let url = base
        .join(&chapter.ordinal.to_string())
        .map_err(|e| Error::InvalidUrl(format!("{}{}: {}", base, chapter.ordinal, e)))?;
    let mut page = transport.fetch_document(&url)?;
    sanitized_storytext(&mut page)
}

/// Pulls `#storytext` out of a chapter page, strips the legacy
/// presentational attributes (`noshade` shading, explicit `size`) the site
/// still serves on old stories, and serializes the fragment for embedding.
pub(crate) fn sanitized_storytext(page: &mut Html) -> Result<String, Error> {
    let mut strips = Vec::new();
    {
        let storytext = page
            .select(&STORYTEXT_SELECTOR)
            .next()
            .ok_or(Error::MissingElement("#storytext"))?;
        for node in storytext.descendants() {
            if let Node::Element(element) = node.value() {
                for name in ["noshade", "size"] {
                    let attr_name = html_attr_name(name);
                    if element.attrs.contains_key(&attr_name) {
                        strips.push(AttributeStrip {
                            node_id: node.id(),
                            attr_name,
                        });
                    }
                }
            }
        }
    }
    page.strip_attributes(strips);
    let storytext = page
        .select(&STORYTEXT_SELECTOR)
        .next()
        .ok_or(Error::MissingElement("#storytext"))?;
    Ok(fixup_html(storytext.inner_xml()))
}

/// Undoes Cloudflare's email protection so addresses mentioned in the text
/// survive into the book.
pub(crate) fn fixup_html(input: String) -> String {
    CLOUDFLARE_EMAIL_REGEX
        .replace_all(&input, |captures: &Captures| {
            let data = captures.get(1).unwrap().as_str();
            let bytes = hex::decode(data).expect("mangled email data is not a hex string");
            assert!(bytes.len() >= 2, "mangled email data not long enough");
            let key = bytes[0];
            let decoded = bytes[1..].iter().map(|byte| byte ^ key).collect::<Vec<u8>>();

            std::str::from_utf8(&decoded)
                .expect("decoded email isn't a UTF-8 string")
                .to_string()
        })
        .to_string()
}

#[test]
fn test_label_with_dot_separator() {
    let chapter = Chapter::parse("12. Some Title").unwrap();
    assert_eq!(12, chapter.ordinal);
    assert_eq!("Some Title", chapter.title);
}

#[test]
fn test_label_with_dash_separator() {
    let chapter = Chapter::parse("3 - Other").unwrap();
    assert_eq!(3, chapter.ordinal);
    assert_eq!("Other", chapter.title);
}

#[test]
fn test_label_with_parenthesis_separator() {
    let chapter = Chapter::parse("7) Aftermath").unwrap();
    assert_eq!(7, chapter.ordinal);
    assert_eq!("Aftermath", chapter.title);
}

#[test]
fn test_label_without_a_number_is_fatal() {
    assert!(Chapter::parse("Epilogue").is_err());
    assert!(Chapter::parse("").is_err());
}

#[test]
fn test_sanitizer_strips_presentational_attributes() {
    let mut page = Html::parse_document(
        "<html><body><div id='storytext'>\
         <p><font size='2'>It began</font></p><hr size='1' noshade='noshade'>\
         <p align='center'>later.</p>\
         </div></body></html>",
    );
    let text = sanitized_storytext(&mut page).unwrap();
    assert!(!text.contains("noshade"), "noshade survived: {}", text);
    assert!(!text.contains("size"), "size survived: {}", text);
    // Other attributes are left alone.
    assert!(text.contains("align"), "align was lost: {}", text);
    assert!(text.contains("It began"));
}

#[test]
fn test_sanitizer_requires_storytext() {
    let mut page = Html::parse_document("<html><body><div id='other'/></body></html>");
    match sanitized_storytext(&mut page) {
        Err(Error::MissingElement(selector)) => assert_eq!("#storytext", selector),
        other => panic!("expected a missing element error, got {:?}", other),
    }
}

#[test]
fn test_mangled_email_is_decoded() {
    // "a@b.c" xor-ed with key 0x42.
    let input = concat!(
        r#"<p>mail <a href="/cdn-cgi/l/email-protection" class="__cf_email__" "#,
        r#"data-cfemail="422302206c21">[email&nbsp;protected]</a> me</p>"#,
    )
    .to_string();
    assert_eq!("<p>mail a@b.c me</p>", fixup_html(input));
}
