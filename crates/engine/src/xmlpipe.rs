//! xmlpipe2 serialization of feeds
//!
//! Output layout:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <sphinx:docset>
//!   <sphinx:schema>
//!     <sphinx:field name="title"/>
//!     <sphinx:field name="classname" attr="string"/>
//!   </sphinx:schema>
//!   <sphinx:document id="7">
//!     <title>First Post</title>
//!     <classname>Post</classname>
//!   </sphinx:document>
//! </sphinx:docset>
//! ```
//!
//! `classname` is both a full-text field (so `@classname Post` restricts a
//! query to one type) and a string attribute the resolver decodes.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use docsync_core::Result;

use crate::feed::{Feed, FeedEntry};

/// Name of the type discriminator field and attribute
pub const CLASSNAME_ATTR: &str = "classname";

/// Writes feed entries as an xmlpipe2 docset
pub struct XmlDocsetWriter<W: Write> {
    writer: Writer<W>,
    documents: usize,
}

impl<W: Write> XmlDocsetWriter<W> {
    /// Start a docset: declaration, `<sphinx:docset>` and the schema
    pub fn begin(inner: W, field_names: &[String]) -> Result<Self> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("sphinx:docset")))?;
        writer.write_event(Event::Start(BytesStart::new("sphinx:schema")))?;
        for name in field_names {
            writer.write_event(Event::Empty(
                BytesStart::new("sphinx:field").with_attributes([("name", name.as_str())]),
            ))?;
        }
        writer.write_event(Event::Empty(
            BytesStart::new("sphinx:field")
                .with_attributes([("name", CLASSNAME_ATTR), ("attr", "string")]),
        ))?;
        writer.write_event(Event::End(BytesEnd::new("sphinx:schema")))?;
        Ok(XmlDocsetWriter {
            writer,
            documents: 0,
        })
    }

    /// Append one `<sphinx:document>`
    pub fn write_entry(&mut self, entry: &FeedEntry) -> Result<()> {
        let id = entry.search_id.to_string();
        self.writer.write_event(Event::Start(
            BytesStart::new("sphinx:document").with_attributes([("id", id.as_str())]),
        ))?;
        for (name, text) in &entry.fields {
            self.write_text_element(name, text)?;
        }
        self.write_text_element(CLASSNAME_ATTR, entry.type_name.as_str())?;
        self.writer
            .write_event(Event::End(BytesEnd::new("sphinx:document")))?;
        self.documents += 1;
        Ok(())
    }

    /// Documents written so far
    pub fn documents(&self) -> usize {
        self.documents
    }

    /// Close the docset and hand back the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .write_event(Event::End(BytesEnd::new("sphinx:docset")))?;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n")?;
        inner.flush()?;
        Ok(inner)
    }

    fn write_text_element(&mut self, name: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            self.writer.write_event(Event::Empty(BytesStart::new(name)))?;
            return Ok(());
        }
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

/// Drain `feed` into `out` as a complete docset.
///
/// Stops at the first error item of the feed; the partial output must not
/// be handed to the indexer.
pub fn write_feed<W: Write>(feed: &mut Feed, out: W) -> Result<W> {
    let field_names = feed.field_names().to_vec();
    let mut docset = XmlDocsetWriter::begin(out, &field_names)?;
    for entry in feed.by_ref() {
        docset.write_entry(&entry?)?;
    }
    docset.finish()
}
