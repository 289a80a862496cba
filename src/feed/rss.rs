use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use thiserror::Error;

/// Errors produced while decoding an RSS document.
#[derive(Debug, Error)]
pub enum RssError {
    /// The body is not well-formed XML.
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// The document ended with elements still open.
    #[error("Unexpected end of document inside <{0}>")]
    Truncated(String),

    /// Well-formed XML, but not an RSS document.
    #[error("Document has no <channel> element")]
    MissingChannel,
}

/// An RSS 2.0 document: one channel and its items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssFeed {
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Items in document order (usually newest first)
    pub items: Vec<RssItem>,
}

/// A feed entry as published, before it becomes a post.
///
/// `pub_date` is kept verbatim; see [`crate::feed::normalize_pub_date`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

/// What an opening tag means at its position in the document
enum Element {
    Channel,
    Item,
    Field(Field),
    Other,
}

/// Classify `name` given the names of its open ancestors (root first).
///
/// Only unprefixed names directly under `<channel>` / `<channel><item>` count,
/// so `atom:link`, `media:content` and friends are ignored.
fn classify(ancestors: &[Vec<u8>], name: &[u8]) -> Element {
    match ancestors {
        [_root] if name == b"channel" => Element::Channel,
        [_root, channel] if channel.as_slice() == b"channel" => match name {
            b"item" => Element::Item,
            b"title" => Element::Field(Field::ChannelTitle),
            b"link" => Element::Field(Field::ChannelLink),
            b"description" => Element::Field(Field::ChannelDescription),
            _ => Element::Other,
        },
        [_root, channel, item]
            if channel.as_slice() == b"channel" && item.as_slice() == b"item" =>
        {
            match name {
                b"title" => Element::Field(Field::ItemTitle),
                b"link" => Element::Field(Field::ItemLink),
                b"description" => Element::Field(Field::ItemDescription),
                b"pubDate" => Element::Field(Field::ItemPubDate),
                _ => Element::Other,
            }
        }
        _ => Element::Other,
    }
}

impl RssFeed {
    fn slot(&mut self, field: Field) -> Option<&mut String> {
        let channel = &mut self.channel;
        match field {
            Field::ChannelTitle => Some(&mut channel.title),
            Field::ChannelLink => Some(&mut channel.link),
            Field::ChannelDescription => Some(&mut channel.description),
            Field::ItemTitle => channel.items.last_mut().map(|i| &mut i.title),
            Field::ItemLink => channel.items.last_mut().map(|i| &mut i.link),
            Field::ItemDescription => channel.items.last_mut().map(|i| &mut i.description),
            Field::ItemPubDate => channel.items.last_mut().map(|i| &mut i.pub_date),
        }
    }

    /// Decode HTML entities in the channel title/description and in every
    /// item's title/description.
    ///
    /// Items are rewritten in place so the decoded text is what gets stored.
    pub fn unescape_html(&mut self) {
        let channel = &mut self.channel;
        channel.title = decode_html(&channel.title);
        channel.description = decode_html(&channel.description);
        for item in channel.items.iter_mut() {
            item.title = decode_html(&item.title);
            item.description = decode_html(&item.description);
        }
    }
}

fn decode_html(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Decode an RSS 2.0 body.
///
/// XML escapes are resolved here; HTML entities inside text are left for
/// [`RssFeed::unescape_html`]. Unknown elements are skipped.
///
/// # Errors
///
/// - [`RssError::Xml`] for malformed XML, including undeclared entities
/// - [`RssError::Truncated`] when the body ends before its closing tags
/// - [`RssError::MissingChannel`] when there is no `<channel>` under the root
pub fn parse_rss(bytes: &[u8]) -> Result<RssFeed, RssError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; custom
    // entities surface as an unescape error.
    let mut reader = Reader::from_reader(bytes);

    let mut feed = RssFeed::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    // Field being collected and the stack depth of its element
    let mut current: Option<(Field, usize)> = None;
    let mut seen_channel = false;

    loop {
        let event = reader.read_event().map_err(|e| RssError::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if current.is_none() {
                    match classify(&stack, &name) {
                        Element::Channel => seen_channel = true,
                        Element::Item => feed.channel.items.push(RssItem::default()),
                        Element::Field(field) => {
                            // A repeated element replaces the earlier value
                            if let Some(slot) = feed.slot(field) {
                                slot.clear();
                            }
                            current = Some((field, stack.len() + 1));
                        }
                        Element::Other => {}
                    }
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                if current.is_none() {
                    match classify(&stack, e.name().as_ref()) {
                        Element::Channel => seen_channel = true,
                        Element::Item => feed.channel.items.push(RssItem::default()),
                        Element::Field(field) => {
                            if let Some(slot) = feed.slot(field) {
                                slot.clear();
                            }
                        }
                        Element::Other => {}
                    }
                }
            }
            Event::End(_) => {
                stack.pop();
                if matches!(current, Some((_, depth)) if stack.len() < depth) {
                    current = None;
                }
            }
            Event::Text(e) => {
                if let Some((field, _)) = current {
                    let text = e.unescape().map_err(|err| RssError::Xml {
                        position: reader.buffer_position() as u64,
                        message: err.to_string(),
                    })?;
                    if let Some(slot) = feed.slot(field) {
                        slot.push_str(&text);
                    }
                }
            }
            Event::CData(e) => {
                if let Some((field, _)) = current {
                    let text: Cow<'_, str> = String::from_utf8_lossy(&e);
                    if let Some(slot) = feed.slot(field) {
                        slot.push_str(&text);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(RssError::Truncated(
            String::from_utf8_lossy(open).into_owned(),
        ));
    }
    if !seen_channel {
        return Err(RssError::MissingChannel);
    }

    Ok(feed)
}
