use ego_tree::NodeId;
use markup5ever::{LocalName, QualName};
use scraper::{ElementRef, Html, Node};
#[cfg(test)]
use scraper::Selector;
use xml5ever::serialize::{serialize, SerializeOpts, TraversalScope};

/// XML serialization for scraped fragments. Chapter content is embedded in
/// XHTML documents, so the HTML serializer (which happily emits void tags
/// like `<br>`) is not an option.
pub(crate) trait XmlSerializable {
    fn serialize_xml(&self, traversal_scope: TraversalScope) -> String;

    /// Returns the XML of this element.
    fn xml(&self) -> String {
        self.serialize_xml(TraversalScope::IncludeNode)
    }

    /// Returns the inner XML of this element.
    fn inner_xml(&self) -> String {
        self.serialize_xml(TraversalScope::ChildrenOnly(None))
    }
}

impl<'a> XmlSerializable for ElementRef<'a> {
    fn serialize_xml(&self, traversal_scope: TraversalScope) -> String {
        let opts = SerializeOpts { traversal_scope };
        let mut buf = Vec::new();
        serialize(&mut buf, self, opts).unwrap();
        String::from_utf8(buf)
            .unwrap()
            // The serializer does not support XML fragments,
            // we need to remove redundant namespace attributes.
            .replace(r#" xmlns="http://www.w3.org/1999/xhtml""#, "")
    }
}

/// Creates a qualified name for a HTML attribute (attributes carry no
/// namespace).
pub(crate) fn html_attr_name(name: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(name))
}

/// One scheduled attribute removal. Removals are collected while the tree is
/// borrowed for traversal and applied in a second pass.
pub(crate) struct AttributeStrip {
    pub node_id: NodeId,
    pub attr_name: QualName,
}

pub(crate) trait MutableDom {
    fn strip_attributes(&mut self, strips: Vec<AttributeStrip>);
}

impl MutableDom for Html {
    fn strip_attributes(&mut self, strips: Vec<AttributeStrip>) {
        for strip in strips {
            if let Some(mut node) = self.tree.get_mut(strip.node_id) {
                if let Node::Element(ref mut element) = node.value() {
                    element.attrs.remove(&strip.attr_name);
                }
            }
        }
    }
}

#[test]
fn test_strip_attributes() {
    let mut doc = Html::parse_fragment(
        "<p><font size='2'>One</font> <hr noshade='noshade'/> <em title='kept'>Two</em></p>",
    );
    let mut strips = Vec::new();
    for node in doc.root_element().descendants() {
        if let Node::Element(element) = node.value() {
            for name in ["size", "noshade"] {
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
    doc.strip_attributes(strips);
    assert_eq!(
        Html::parse_fragment("<p><font>One</font> <hr/> <em title='kept'>Two</em></p>"),
        Html::parse_fragment(&doc.root_element().inner_html()),
    );
}

#[test]
fn test_inner_xml_drops_the_enclosing_tag() {
    let doc = Html::parse_fragment("<p><em>word</em> tail</p>");
    let p = doc
        .select(&Selector::parse("p").unwrap())
        .next()
        .expect("paragraph not found");
    let inner = p.inner_xml();
    assert!(!inner.contains("<p"), "inner xml still carries the element: {}", inner);
    assert_eq!(
        Html::parse_fragment("<em>word</em> tail"),
        Html::parse_fragment(&inner),
    );
}

#[test]
fn test_xml_includes_the_element_itself() {
    let doc = Html::parse_fragment("<p><em>word</em></p>");
    let em = doc
        .select(&Selector::parse("em").unwrap())
        .next()
        .expect("em not found");
    assert_eq!("<em>word</em>", em.xml());
}
