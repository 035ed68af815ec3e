//! Incremental INDI element framing
//!
//! Transports deliver text in blocks that ignore XML boundaries (browsers cut
//! WebSocket frames at 4096 bytes, sockets at whatever the read returned), so
//! an element may arrive split mid-tag, mid-attribute or mid-name. The
//! extractor accumulates text and hands out complete top-level elements in
//! document order. Each cycle:
//!
//! 1. locates the next top-level `*Vector` element whose matching close tag
//!    (same name, same depth) has arrived
//! 2. emits every complete `<message>` and `<delProperty>` notice that starts
//!    before that element ends, including notices embedded in its span; with
//!    no complete element, every complete notice in the buffer
//! 3. emits the element itself
//!
//! Scanning is byte based and quote aware, and each stage keeps a resume
//! cursor so a large BLOB arriving in many small chunks is scanned once.
//! Skipped top-level text (`pingRequest`, comments, stray tails) is dropped as
//! soon as nothing complete remains in front of it.

use std::collections::VecDeque;

use crate::protocol::{DEL_PROPERTY, MESSAGE, VECTOR_SUFFIX};

const NOTICE_TAGS: [&str; 2] = [MESSAGE, DEL_PROPERTY];

/// Accumulates chunked text and extracts complete INDI elements
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buffer: String,
    ready: VecDeque<String>,
    /// No complete notice starts before this offset
    notice_cursor: usize,
    /// Top-level scan position when no element is open
    top_cursor: usize,
    pending: Option<Pending>,
}

/// An opened top-level element waiting for its close tag
#[derive(Debug)]
struct Pending {
    start: usize,
    name: String,
    depth: usize,
    cursor: usize,
    /// false for non-INDI elements that are skipped once closed
    emit: bool,
    /// Offset just past the close tag, once it has arrived
    end: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    Empty,
    /// Comment, processing instruction, CDATA or doctype
    Markup,
}

#[derive(Debug, Clone, Copy)]
struct Tag {
    kind: TagKind,
    name_start: usize,
    name_end: usize,
    /// Offset just past the closing `>`
    end: usize,
}

#[derive(Debug, Clone, Copy)]
enum Scan {
    Incomplete,
    /// A `<` that does not start a tag
    Stray,
    Tag(Tag),
}

#[derive(Debug, Clone, Copy)]
enum Close {
    Found(usize),
    Incomplete(usize),
}

/// Lazy sequence of complete elements
pub struct Frames<'a> {
    extractor: &'a mut FrameExtractor,
}

impl Iterator for Frames<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.extractor.next_frame()
    }
}

impl FrameExtractor {
    /// Create an empty extractor
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the elements it completed.
    ///
    /// Elements the caller does not pull from the iterator stay queued and
    /// are returned by the next `feed` or [`frames`](Self::frames).
    pub fn feed(&mut self, chunk: &str) -> Frames<'_> {
        self.buffer.push_str(chunk);
        Frames { extractor: self }
    }

    /// Iterate over already buffered complete elements
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { extractor: self }
    }

    /// Next complete element, if one is available
    pub fn next_frame(&mut self) -> Option<String> {
        if self.ready.is_empty() {
            self.locate_element();
            self.scrape_notices();
            match self.pending.as_ref().and_then(|p| p.end.map(|end| (p.start, end))) {
                Some((start, end)) => {
                    let element = self.take_through(start, end);
                    self.ready.push_back(element);
                }
                None => self.discard_skipped(),
            }
        }
        let frame = self.ready.pop_front();
        if frame.is_none() && !self.buffer.trim().is_empty() {
            if let Some(pending) = &self.pending {
                tracing::debug!(
                    "Waiting for </{}>: {} bytes buffered",
                    pending.name,
                    self.buffer.len()
                );
            }
        }
        frame
    }

    /// Discard all buffered text (transport closed)
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!("Discarding {} bytes of partial INDI XML", self.buffer.len());
        }
        *self = Self::default();
    }

    /// Number of bytes currently buffered
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Name of the top-level element still waiting for its close tag
    pub fn pending_element(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.name.as_str())
    }

    /// Pull complete notices out of the buffer in document order, stopping
    /// at the end of a located element
    fn scrape_notices(&mut self) {
        let mut cursor = self.notice_cursor;

        loop {
            let Some((pos, tag)) = find_notice_start(self.buffer.as_bytes(), cursor) else {
                // Keep a partial `<delProp` at the tail visible to the next scan
                let longest = NOTICE_TAGS.iter().map(|t| t.len()).max().unwrap_or(0);
                cursor = self.buffer.len().saturating_sub(longest);
                break;
            };
            let limit = self.pending.as_ref().and_then(|p| p.end);
            if limit.is_some_and(|limit| pos >= limit) {
                cursor = pos;
                break;
            }
            let bytes = self.buffer.as_bytes();
            let after = pos + 1 + tag.len();
            if after >= bytes.len() {
                cursor = pos;
                break;
            }
            if !is_name_delimiter(bytes[after]) {
                // `<messageFoo` and the like
                cursor = after;
                continue;
            }

            let end = match scan_tag(bytes, pos) {
                Scan::Incomplete => {
                    cursor = pos;
                    break;
                }
                Scan::Stray => {
                    cursor = pos + 1;
                    continue;
                }
                Scan::Tag(t) if t.kind == TagKind::Empty => t.end,
                Scan::Tag(t) if t.kind == TagKind::Open => {
                    let mut depth = 1;
                    match find_close(bytes, tag, t.end, &mut depth) {
                        Close::Found(end) => end,
                        Close::Incomplete(_) => {
                            cursor = pos;
                            break;
                        }
                    }
                }
                Scan::Tag(t) => {
                    cursor = t.end;
                    continue;
                }
            };

            let notice = self.remove_range(pos, end);
            self.ready.push_back(notice);
            cursor = pos;
        }

        self.notice_cursor = cursor;
    }

    /// Find the next complete top-level vector element and record its end
    /// in `pending`
    fn locate_element(&mut self) {
        loop {
            if self.pending.is_none() {
                let bytes = self.buffer.as_bytes();
                let Some(pos) = find_byte(bytes, self.top_cursor, b'<') else {
                    self.top_cursor = bytes.len();
                    return;
                };

                match scan_tag(bytes, pos) {
                    Scan::Incomplete => {
                        self.top_cursor = pos;
                        return;
                    }
                    Scan::Stray => {
                        self.top_cursor = pos + 1;
                    }
                    Scan::Tag(tag) => {
                        let name = &self.buffer[tag.name_start..tag.name_end];
                        let emit = is_vector_name(name);
                        match tag.kind {
                            TagKind::Empty if emit => {
                                self.pending = Some(Pending {
                                    start: pos,
                                    name: name.to_string(),
                                    depth: 0,
                                    cursor: tag.end,
                                    emit,
                                    end: Some(tag.end),
                                });
                                return;
                            }
                            TagKind::Open => {
                                self.pending = Some(Pending {
                                    start: pos,
                                    name: name.to_string(),
                                    depth: 1,
                                    cursor: tag.end,
                                    emit,
                                    end: None,
                                });
                            }
                            TagKind::Markup => {
                                self.top_cursor = tag.end;
                            }
                            _ => {
                                if !is_notice_name(name) {
                                    tracing::debug!("Skipping top-level <{}>", name);
                                }
                                self.top_cursor = tag.end;
                            }
                        }
                    }
                }
                continue;
            }

            let Some(pending) = self.pending.as_mut() else {
                return;
            };
            if pending.end.is_some() {
                return;
            }
            match find_close(
                self.buffer.as_bytes(),
                &pending.name,
                pending.cursor,
                &mut pending.depth,
            ) {
                Close::Incomplete(cursor) => {
                    pending.cursor = cursor;
                    return;
                }
                Close::Found(end) if pending.emit => {
                    pending.cursor = end;
                    pending.end = Some(end);
                    return;
                }
                Close::Found(end) => {
                    if !is_notice_name(&pending.name) {
                        tracing::debug!("Skipping top-level <{}> element", pending.name);
                    }
                    self.pending = None;
                    self.top_cursor = end;
                }
            }
        }
    }

    /// Return `buffer[start..end]` and drop everything before `end`
    fn take_through(&mut self, start: usize, end: usize) -> String {
        let element = self.buffer[start..end].to_string();
        self.buffer.drain(..end);
        self.pending = None;
        self.top_cursor = 0;
        self.notice_cursor = self.notice_cursor.saturating_sub(end);
        element
    }

    /// Drop skipped text in front of the scan position. Every complete
    /// notice has been pulled out by now and incomplete tags stop the scan,
    /// so nothing before it is still wanted.
    fn discard_skipped(&mut self) {
        let upto = self.pending.as_ref().map_or(self.top_cursor, |p| p.start);
        if upto == 0 {
            return;
        }
        self.buffer.drain(..upto);
        self.top_cursor = self.top_cursor.saturating_sub(upto);
        self.notice_cursor = self.notice_cursor.saturating_sub(upto);
        if let Some(pending) = self.pending.as_mut() {
            pending.start -= upto;
            pending.cursor -= upto;
        }
    }

    /// Cut `buffer[start..end]` out of the middle of the buffer, shifting cursors
    fn remove_range(&mut self, start: usize, end: usize) -> String {
        let removed = self.buffer[start..end].to_string();
        self.buffer.replace_range(start..end, "");

        let shift = |offset: usize| -> usize {
            if offset >= end {
                offset - (end - start)
            } else if offset > start {
                start
            } else {
                offset
            }
        };
        self.notice_cursor = shift(self.notice_cursor);
        self.top_cursor = shift(self.top_cursor);
        if let Some(pending) = self.pending.as_mut() {
            pending.start = shift(pending.start);
            pending.cursor = shift(pending.cursor);
            pending.end = pending.end.map(shift);
        }
        removed
    }
}

/// True for `defNumberVector`, `setBLOBVector`, ... and any other `*Vector`
fn is_vector_name(name: &str) -> bool {
    name.len() > VECTOR_SUFFIX.len() && name.ends_with(VECTOR_SUFFIX)
}

fn is_name_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>'
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|i| from + i)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let hay = bytes.get(from..)?;
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    hay.windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

fn is_notice_name(name: &str) -> bool {
    NOTICE_TAGS.contains(&name)
}

/// Offset and tag name of the next `<message` or `<delProperty` at or after `from`
fn find_notice_start(bytes: &[u8], from: usize) -> Option<(usize, &'static str)> {
    let mut at = from;
    loop {
        let pos = find_byte(bytes, at, b'<')?;
        let rest = &bytes[pos + 1..];
        if let Some(tag) = NOTICE_TAGS.iter().find(|t| rest.starts_with(t.as_bytes())) {
            return Some((pos, *tag));
        }
        at = pos + 1;
    }
}

/// Scan the tag starting at `bytes[at] == b'<'`
fn scan_tag(bytes: &[u8], at: usize) -> Scan {
    let rest = &bytes[at..];
    if rest.len() < 2 {
        return Scan::Incomplete;
    }

    match rest[1] {
        b'!' => {
            let forms: [(&[u8], &[u8]); 2] = [(b"<!--", b"-->"), (b"<![CDATA[", b"]]>")];
            for (open, close) in forms {
                if rest.starts_with(open) {
                    return match find_seq(bytes, at + open.len(), close) {
                        Some(i) => markup(at, i + close.len()),
                        None => Scan::Incomplete,
                    };
                }
                if open.starts_with(rest) {
                    return Scan::Incomplete;
                }
            }
            match find_gt(bytes, at + 2) {
                Some(i) => markup(at, i + 1),
                None => Scan::Incomplete,
            }
        }
        b'?' => match find_seq(bytes, at + 2, b"?>") {
            Some(i) => markup(at, i + 2),
            None => Scan::Incomplete,
        },
        b'/' => {
            let name_start = at + 2;
            let name_end = match name_end(bytes, name_start) {
                Some(i) => i,
                None => return Scan::Incomplete,
            };
            match find_gt(bytes, name_end) {
                Some(i) => Scan::Tag(Tag {
                    kind: TagKind::Close,
                    name_start,
                    name_end,
                    end: i + 1,
                }),
                None => Scan::Incomplete,
            }
        }
        _ => {
            let name_start = at + 1;
            let name_end = match name_end(bytes, name_start) {
                Some(i) => i,
                None => return Scan::Incomplete,
            };
            if name_end == name_start {
                return Scan::Stray;
            }
            match find_gt(bytes, name_end) {
                Some(i) => Scan::Tag(Tag {
                    kind: if bytes[i - 1] == b'/' {
                        TagKind::Empty
                    } else {
                        TagKind::Open
                    },
                    name_start,
                    name_end,
                    end: i + 1,
                }),
                None => Scan::Incomplete,
            }
        }
    }
}

fn markup(at: usize, end: usize) -> Scan {
    Scan::Tag(Tag {
        kind: TagKind::Markup,
        name_start: at,
        name_end: at,
        end,
    })
}

/// End of a tag name; `None` when the buffer ends inside it
fn name_end(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&i| is_name_delimiter(bytes[i]))
}

/// Next `>` outside of quoted attribute values
fn find_gt(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Find the close tag matching an open `name` element, tracking nesting depth
fn find_close(bytes: &[u8], name: &str, from: usize, depth: &mut usize) -> Close {
    let mut at = from;
    loop {
        let Some(pos) = find_byte(bytes, at, b'<') else {
            return Close::Incomplete(bytes.len());
        };
        match scan_tag(bytes, pos) {
            Scan::Incomplete => return Close::Incomplete(pos),
            Scan::Stray => at = pos + 1,
            Scan::Tag(tag) => {
                let same = &bytes[tag.name_start..tag.name_end] == name.as_bytes();
                match tag.kind {
                    TagKind::Open if same => *depth += 1,
                    TagKind::Close if same => {
                        *depth -= 1;
                        if *depth == 0 {
                            return Close::Found(tag.end);
                        }
                    }
                    _ => {}
                }
                at = tag.end;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWITCH_DEF: &str = r#"<defSwitchVector device="Dome Simulator" name="SIMULATION" label="Simulation" group="Options" state="Idle" perm="rw" rule="OneOfMany"><defSwitch name="ENABLE" label="Enable">Off</defSwitch><defSwitch name="DISABLE" label="Disable">On</defSwitch></defSwitchVector>"#;
    const NUMBER_SET: &str = "<setNumberVector device=\"Dome Simulator\" name=\"POLLING_PERIOD\" state=\"Ok\">\n  <oneNumber name=\"PERIOD_MS\">\n2000\n  </oneNumber>\n</setNumberVector>";
    const MESSAGE_NOTICE: &str =
        r#"<message device="Dome Simulator" timestamp="2024-01-01T00:00:00" message="Dome is parked"/>"#;
    const DELETE_NOTICE: &str =
        r#"<delProperty device="Dome Simulator" name="SIMULATION" timestamp="2024-01-01T00:00:01"/>"#;

    fn collect(extractor: &mut FrameExtractor, chunk: &str) -> Vec<String> {
        extractor.feed(chunk).collect()
    }

    fn feed_pieces(pieces: &[&str]) -> Vec<String> {
        let mut extractor = FrameExtractor::new();
        let mut out = Vec::new();
        for piece in pieces {
            out.extend(collect(&mut extractor, piece));
        }
        out
    }

    /// Split at every char boundary, one split point at a time
    fn every_split(doc: &str) -> Vec<(String, String)> {
        (0..=doc.len())
            .filter(|&i| doc.is_char_boundary(i))
            .map(|i| (doc[..i].to_string(), doc[i..].to_string()))
            .collect()
    }

    #[test]
    fn test_single_element() {
        let frames = feed_pieces(&[SWITCH_DEF]);
        assert_eq!(frames, vec![SWITCH_DEF.to_string()]);
    }

    #[test]
    fn test_split_at_every_offset() {
        for (head, tail) in every_split(SWITCH_DEF) {
            let frames = feed_pieces(&[&head, &tail]);
            assert_eq!(frames, vec![SWITCH_DEF.to_string()], "split at {}", head.len());
        }
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let doc = format!("{}{}", NUMBER_SET, SWITCH_DEF);
        let mut extractor = FrameExtractor::new();
        let mut frames = Vec::new();
        let mut buf = [0u8; 4];
        for ch in doc.chars() {
            frames.extend(collect(&mut extractor, ch.encode_utf8(&mut buf)));
        }
        assert_eq!(frames, vec![NUMBER_SET.to_string(), SWITCH_DEF.to_string()]);
        assert_eq!(extractor.buffered_len(), 0);
    }

    #[test]
    fn test_order_preservation() {
        let doc = format!("{}\n{}\n{}", NUMBER_SET, SWITCH_DEF, NUMBER_SET);
        let frames = feed_pieces(&[&doc]);
        assert_eq!(
            frames,
            vec![
                NUMBER_SET.to_string(),
                SWITCH_DEF.to_string(),
                NUMBER_SET.to_string()
            ]
        );
    }

    #[test]
    fn test_fixed_block_delivery() {
        let doc = format!("{}{}{}{}", SWITCH_DEF, MESSAGE_NOTICE, NUMBER_SET, DELETE_NOTICE).repeat(3);
        for block in [1, 7, 64, 4096] {
            let bytes = doc.as_bytes();
            let pieces: Vec<&str> = bytes
                .chunks(block)
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect();
            let frames = feed_pieces(&pieces);
            assert_eq!(frames.len(), 12, "block size {}", block);
            assert_eq!(frames.iter().filter(|f| f.starts_with("<message")).count(), 3);
            assert_eq!(frames.iter().filter(|f| f.starts_with("<delProperty")).count(), 3);
            let vectors: Vec<&String> = frames.iter().filter(|f| f.ends_with("Vector>")).collect();
            assert_eq!(vectors.len(), 6);
            assert_eq!(vectors[0], SWITCH_DEF);
            assert_eq!(vectors[1], NUMBER_SET);
        }
    }

    #[test]
    fn test_message_before_and_after_vector() {
        let doc = format!("{}{}{}", MESSAGE_NOTICE, SWITCH_DEF, MESSAGE_NOTICE);
        let frames = feed_pieces(&[&doc]);
        assert_eq!(
            frames,
            vec![
                MESSAGE_NOTICE.to_string(),
                SWITCH_DEF.to_string(),
                MESSAGE_NOTICE.to_string()
            ]
        );
    }

    #[test]
    fn test_message_straddling_vector_boundary() {
        // The notice lands between the vector's open tag and its children
        let split = SWITCH_DEF.find("<defSwitch ").unwrap();
        let (head, tail) = SWITCH_DEF.split_at(split);

        let mut extractor = FrameExtractor::new();
        assert!(collect(&mut extractor, head).is_empty());
        assert_eq!(extractor.pending_element(), Some("defSwitchVector"));

        let frames = collect(&mut extractor, MESSAGE_NOTICE);
        assert_eq!(frames, vec![MESSAGE_NOTICE.to_string()]);

        let frames = collect(&mut extractor, tail);
        assert_eq!(frames, vec![SWITCH_DEF.to_string()]);
    }

    #[test]
    fn test_message_split_inside_pending_vector() {
        let split = SWITCH_DEF.find("<defSwitch ").unwrap();
        let (head, tail) = SWITCH_DEF.split_at(split);
        let doc = format!("{}{}{}", head, MESSAGE_NOTICE, tail);

        for (a, b) in every_split(&doc) {
            let frames = feed_pieces(&[&a, &b]);
            assert_eq!(
                frames,
                vec![MESSAGE_NOTICE.to_string(), SWITCH_DEF.to_string()],
                "split at {}",
                a.len()
            );
        }
    }

    #[test]
    fn test_delete_notice_extracted() {
        let doc = format!("{}{}{}", SWITCH_DEF, DELETE_NOTICE, MESSAGE_NOTICE);
        let frames = feed_pieces(&[&doc]);
        assert_eq!(
            frames,
            vec![
                SWITCH_DEF.to_string(),
                DELETE_NOTICE.to_string(),
                MESSAGE_NOTICE.to_string()
            ]
        );
    }

    #[test]
    fn test_definition_then_delete_in_one_chunk() {
        let doc = format!("{}{}", SWITCH_DEF, DELETE_NOTICE);
        assert_eq!(
            feed_pieces(&[&doc]),
            vec![SWITCH_DEF.to_string(), DELETE_NOTICE.to_string()]
        );

        // Same order whichever way the pair is cut
        for (a, b) in every_split(&doc) {
            assert_eq!(
                feed_pieces(&[&a, &b]),
                vec![SWITCH_DEF.to_string(), DELETE_NOTICE.to_string()],
                "split at {}",
                a.len()
            );
        }
    }

    #[test]
    fn test_notices_between_vectors_keep_their_place() {
        let doc = format!(
            "{}{}{}{}{}",
            DELETE_NOTICE, NUMBER_SET, MESSAGE_NOTICE, DELETE_NOTICE, SWITCH_DEF
        );
        assert_eq!(
            feed_pieces(&[&doc]),
            vec![
                DELETE_NOTICE.to_string(),
                NUMBER_SET.to_string(),
                MESSAGE_NOTICE.to_string(),
                DELETE_NOTICE.to_string(),
                SWITCH_DEF.to_string()
            ]
        );
    }

    #[test]
    fn test_delete_inside_pending_vector_comes_first() {
        let split = SWITCH_DEF.find("<defSwitch ").unwrap();
        let (head, tail) = SWITCH_DEF.split_at(split);
        let doc = format!("{}{}{}", head, DELETE_NOTICE, tail);
        assert_eq!(
            feed_pieces(&[&doc]),
            vec![DELETE_NOTICE.to_string(), SWITCH_DEF.to_string()]
        );
    }

    #[test]
    fn test_skipped_pings_do_not_accumulate() {
        let mut extractor = FrameExtractor::new();
        for uid in 0..100 {
            let ping = format!("<pingRequest uid=\"{}\"/>\n", uid);
            assert!(collect(&mut extractor, &ping).is_empty());
        }
        assert_eq!(extractor.buffered_len(), 0);

        // An unfinished ping stays, the finished text in front of it goes
        let partial = "<pingRequest uid=\"a\"></pingRe";
        assert!(collect(&mut extractor, &format!("<!-- x -->{}", partial)).is_empty());
        assert_eq!(extractor.buffered_len(), partial.len());

        let rest = format!("quest>{}", NUMBER_SET);
        assert_eq!(collect(&mut extractor, &rest), vec![NUMBER_SET.to_string()]);
        assert_eq!(extractor.buffered_len(), 0);
    }

    #[test]
    fn test_open_close_message_form() {
        let notice = r#"<message device="CCD" message="hi"></message>"#;
        let frames = feed_pieces(&[notice]);
        assert_eq!(frames, vec![notice.to_string()]);
    }

    #[test]
    fn test_incomplete_element_retained() {
        let (head, _) = NUMBER_SET.split_at(NUMBER_SET.len() - 3);
        let mut extractor = FrameExtractor::new();
        assert!(collect(&mut extractor, head).is_empty());
        assert_eq!(extractor.buffered_len(), head.len());
        assert!(extractor.frames().next().is_none());
        assert_eq!(extractor.buffered_len(), head.len());
    }

    #[test]
    fn test_reset_discards_partial() {
        let (head, tail) = SWITCH_DEF.split_at(40);
        let mut extractor = FrameExtractor::new();
        assert!(collect(&mut extractor, head).is_empty());
        extractor.reset();
        assert_eq!(extractor.buffered_len(), 0);
        assert!(extractor.pending_element().is_none());

        // The tail alone is not an element
        assert!(collect(&mut extractor, tail).is_empty());
        // A fresh element after the junk still frames
        assert_eq!(collect(&mut extractor, NUMBER_SET), vec![NUMBER_SET.to_string()]);
    }

    #[test]
    fn test_back_to_back_same_name_pairs_correctly() {
        let second = NUMBER_SET.replace("2000", "3000");
        let doc = format!("{}{}", NUMBER_SET, second);
        let frames = feed_pieces(&[&doc[..20], &doc[20..]]);
        assert_eq!(frames, vec![NUMBER_SET.to_string(), second]);
    }

    #[test]
    fn test_attribute_containing_markup_characters() {
        let doc = r#"<defTextVector device="D" name="N" label="a > b /> c"><defText name="T" label="x>y">v</defText></defTextVector>"#;
        for (a, b) in every_split(doc) {
            assert_eq!(feed_pieces(&[&a, &b]), vec![doc.to_string()]);
        }
    }

    #[test]
    fn test_non_indi_top_level_tags_skipped() {
        let doc = format!(
            "<?xml version=\"1.0\"?>\n<!-- hello -->\n<getProperties version=\"1.7\"/>\n<pingRequest uid=\"1\"></pingRequest>{}",
            SWITCH_DEF
        );
        assert_eq!(feed_pieces(&[&doc]), vec![SWITCH_DEF.to_string()]);
    }

    #[test]
    fn test_unknown_vector_still_extracted() {
        let doc = r#"<defFooVector device="D" name="N"><defFoo name="x">1</defFoo></defFooVector>"#;
        assert_eq!(feed_pieces(&[doc]), vec![doc.to_string()]);
    }

    #[test]
    fn test_multibyte_content() {
        let doc = r#"<setTextVector device="Focuser" name="TEMP_UNITS"><oneText name="UNIT">°C ±0.5</oneText></setTextVector>"#;
        for (a, b) in every_split(doc) {
            assert_eq!(feed_pieces(&[&a, &b]), vec![doc.to_string()]);
        }
    }

    #[test]
    fn test_large_blob_in_small_chunks() {
        let payload = "QUJD".repeat(50_000);
        let doc = format!(
            "<setBLOBVector device=\"CCD\" name=\"CCD1\" state=\"Ok\"><oneBLOB name=\"CCD1\" size=\"150000\" format=\".fits\">{}</oneBLOB></setBLOBVector>",
            payload
        );
        let mut extractor = FrameExtractor::new();
        let mut frames = Vec::new();
        for piece in doc.as_bytes().chunks(4096) {
            frames.extend(collect(&mut extractor, std::str::from_utf8(piece).unwrap()));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), doc.len());
    }

    #[test]
    fn test_unread_frames_stay_queued() {
        let doc = format!("{}{}", MESSAGE_NOTICE, DELETE_NOTICE);
        let mut extractor = FrameExtractor::new();
        assert_eq!(extractor.feed(&doc).next(), Some(MESSAGE_NOTICE.to_string()));
        assert_eq!(extractor.frames().next(), Some(DELETE_NOTICE.to_string()));
        assert!(extractor.frames().next().is_none());
    }
}
