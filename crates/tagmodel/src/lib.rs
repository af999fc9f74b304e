//! # Tag, TagList and TagMap
//!
//! Metadata (ICY stream titles, Vorbis comments, ID3 frames) flows through
//! the pipeline as a flat, ordered [`TagList`] of lowercase-keyed [`Tag`]s.
//! A [`TagMap`] is the user-configured table (one `[tagmap.<id>]` INI
//! section per entry) that rewrites source tag keys into destination
//! container tag identifiers, with a merge policy for collisions and an
//! unknown-tag policy for anything the table doesn't mention.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use std::collections::HashMap;

/// One metadata record. `key` is always lowercase ASCII; `priority` breaks
/// ties when multiple tags map to the same destination slot (higher wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub priority: u8,
}

impl Tag {
    pub fn new(key: impl AsRef<[u8]>, value: impl Into<Vec<u8>>, priority: u8) -> Self {
        Self { key: membuf::to_ascii_lowercase(key.as_ref()), value: value.into(), priority }
    }

    pub fn key_eq(&self, key: &[u8]) -> bool {
        membuf::eq_ignore_ascii_case(&self.key, key)
    }

    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Ordered sequence of [`Tag`], addressable by key. Duplicate keys are
/// allowed (the source stage appends as it sees them); mapping is where
/// duplicates get resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagList {
    tags: Vec<Tag>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: Tag) {
        self.tags.push(tag);
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    /// First tag matching `key`, case-insensitively.
    pub fn get(&self, key: &[u8]) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key_eq(key))
    }

    /// All tags matching `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a [u8]) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.key_eq(key))
    }

    /// Remove every tag matching `key`.
    pub fn remove_all(&mut self, key: &[u8]) {
        self.tags.retain(|t| !t.key_eq(key));
    }

    /// Keep only the highest-priority tag per key (ties keep the first
    /// occurrence), preserving first-seen key order. This is what
    /// "deduplicated on mapping" (§3) means in practice.
    pub fn deduplicated(&self) -> TagList {
        let mut order: Vec<Vec<u8>> = Vec::new();
        let mut best: HashMap<Vec<u8>, Tag> = HashMap::new();
        for tag in &self.tags {
            match best.get(&tag.key) {
                Some(existing) if existing.priority >= tag.priority => {}
                _ => {
                    if !best.contains_key(&tag.key) {
                        order.push(tag.key.clone());
                    }
                    best.insert(tag.key.clone(), tag.clone());
                }
            }
        }
        TagList { tags: order.into_iter().map(|k| best.remove(&k).unwrap()).collect() }
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;
    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl FromIterator<Tag> for TagList {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        TagList { tags: iter.into_iter().collect() }
    }
}

/// What to do when more than one source tag maps onto the same destination
/// identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep only the first (highest-priority) value; drop the rest.
    #[default]
    Ignore,
    /// Join with a NUL byte (ID3-style multi-value convention).
    NullJoin,
    /// Join with `"; "`.
    SemicolonJoin,
}

impl MergePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Some(Self::Ignore),
            "null" => Some(Self::NullJoin),
            "semicolon" => Some(Self::SemicolonJoin),
            _ => None,
        }
    }

    fn join(self, values: &[&[u8]]) -> Vec<u8> {
        match self {
            MergePolicy::Ignore => values.first().map(|v| v.to_vec()).unwrap_or_default(),
            MergePolicy::NullJoin => values.join(&0u8),
            MergePolicy::SemicolonJoin => {
                let mut out = Vec::new();
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.extend_from_slice(b"; ");
                    }
                    out.extend_from_slice(v);
                }
                out
            }
        }
    }
}

/// What to do with a source tag that has no rule in the active [`TagMapEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTagPolicy {
    #[default]
    Ignore,
    /// Emit as a generic ID3 `TXXX` frame, description = original key.
    Txxx,
}

impl UnknownTagPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Some(Self::Ignore),
            "txxx" => Some(Self::Txxx),
            _ => None,
        }
    }
}

/// One rewrite rule: a source tag key maps onto a destination-container tag
/// identifier (commonly a 4-character ID3 frame id), at a given priority.
/// Modeled on [`Tag`] itself: `key` = source key, `value` = destination id,
/// `priority` = rule priority.
pub type TagMapRule = Tag;

/// One named `[tagmap.<id>]` table: destination id <- set of source-key rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMapEntry {
    pub id: String,
    pub rules: TagList,
}

impl TagMapEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), rules: TagList::new() }
    }

    pub fn add_rule(&mut self, source_key: impl AsRef<[u8]>, dest_id: impl Into<Vec<u8>>, priority: u8) {
        self.rules.push(Tag::new(source_key, dest_id, priority));
    }

    /// Apply this entry's rules to `source`, producing destination-keyed
    /// tags. Rules targeting the same destination id collapse per `merge`;
    /// source tags with no matching rule are handled per `unknown`.
    pub fn map(&self, source: &TagList, merge: MergePolicy, unknown: UnknownTagPolicy) -> TagList {
        let mut dest_order: Vec<Vec<u8>> = Vec::new();
        let mut dest_values: HashMap<Vec<u8>, Vec<(u8, Vec<u8>)>> = HashMap::new();
        let mut matched_keys: Vec<Vec<u8>> = Vec::new();

        for rule in self.rules.iter() {
            for source_tag in source.get_all(&rule.key) {
                matched_keys.push(source_tag.key.clone());
                let dest_key = membuf::to_ascii_lowercase(&rule.value);
                if !dest_values.contains_key(&dest_key) {
                    dest_order.push(dest_key.clone());
                }
                dest_values
                    .entry(dest_key)
                    .or_default()
                    .push((rule.priority, source_tag.value.clone()));
            }
        }

        let mut out = TagList::new();
        for dest_key in dest_order {
            let mut values = dest_values.remove(&dest_key).unwrap_or_default();
            values.sort_by(|a, b| b.0.cmp(&a.0));
            let refs: Vec<&[u8]> = values.iter().map(|(_, v)| v.as_slice()).collect();
            let joined = merge.join(&refs);
            let priority = values.first().map(|(p, _)| *p).unwrap_or(0);
            out.push(Tag { key: dest_key, value: joined, priority });
        }

        if unknown == UnknownTagPolicy::Txxx {
            for tag in source.iter() {
                if matched_keys.iter().any(|k| k == &tag.key) {
                    continue;
                }
                let mut description = tag.key.clone();
                description.push(b'=');
                description.extend_from_slice(&tag.value);
                out.push(Tag::new(b"txxx", description, tag.priority));
            }
        }

        out
    }
}

/// Reserved [`Tag`] key for an out-of-band picture (cover art, album art):
/// demuxers that discover embedded artwork (ID3 `APIC`, FLAC `PICTURE`,
/// Vorbis `METADATA_BLOCK_PICTURE`) emit it through the ordinary tag
/// channel under this key rather than as a [`Frame`](../frame/struct.Frame.html),
/// since it's a one-shot side payload, not encoded audio (§4.8 item 6).
pub const PICTURE_TAG_KEY: &[u8] = b"picture";

/// Encode a picture's mime type and bytes into a single [`Tag`] value
/// (`<mime>\0<bytes>`), keyed [`PICTURE_TAG_KEY`]. A `Destination` that
/// sees this tag and whose muxer's `image_mode()` is `OutOfBand` decodes it
/// with [`decode_picture_tag`], hands the bytes to the output's picture
/// side channel, and replaces the tag's value with the URL reference that
/// comes back.
pub fn encode_picture_tag(mime: &str, bytes: &[u8], priority: u8) -> Tag {
    let mut value = Vec::with_capacity(mime.len() + 1 + bytes.len());
    value.extend_from_slice(mime.as_bytes());
    value.push(0);
    value.extend_from_slice(bytes);
    Tag::new(PICTURE_TAG_KEY, value, priority)
}

/// Split a [`PICTURE_TAG_KEY`]-encoded tag value back into `(mime, bytes)`.
/// `None` if the value has no NUL separator.
pub fn decode_picture_tag(tag: &Tag) -> Option<(&str, &[u8])> {
    let pos = tag.value.iter().position(|&b| b == 0)?;
    let mime = std::str::from_utf8(&tag.value[..pos]).ok()?;
    Some((mime, &tag.value[pos + 1..]))
}

/// A named collection of [`TagMapEntry`] tables, looked up by id
/// (`[tagmap.<id>]` in configuration).
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    entries: HashMap<String, TagMapEntry>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: TagMapEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&TagMapEntry> {
        self.entries.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_highest_priority() {
        let mut list = TagList::new();
        list.push(Tag::new(b"title", b"low".to_vec(), 1));
        list.push(Tag::new(b"title", b"high".to_vec(), 5));
        list.push(Tag::new(b"artist", b"only".to_vec(), 0));
        let deduped = list.deduplicated();
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped.get(b"title").unwrap().value, b"high");
    }

    #[test]
    fn merge_policy_ignore_keeps_first_by_priority() {
        let mut entry = TagMapEntry::new("mp3");
        entry.add_rule(b"artist", b"TPE1".to_vec(), 0);
        entry.add_rule(b"albumartist", b"TPE1".to_vec(), 1);
        let mut source = TagList::new();
        source.push(Tag::new(b"artist", b"A".to_vec(), 0));
        source.push(Tag::new(b"albumartist", b"B".to_vec(), 0));
        let mapped = entry.map(&source, MergePolicy::Ignore, UnknownTagPolicy::Ignore);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped.get(b"tpe1").unwrap().value, b"B");
    }

    #[test]
    fn merge_policy_semicolon_joins_in_priority_order() {
        let mut entry = TagMapEntry::new("mp3");
        entry.add_rule(b"artist", b"TPE1".to_vec(), 0);
        entry.add_rule(b"albumartist", b"TPE1".to_vec(), 1);
        let mut source = TagList::new();
        source.push(Tag::new(b"artist", b"A".to_vec(), 0));
        source.push(Tag::new(b"albumartist", b"B".to_vec(), 0));
        let mapped = entry.map(&source, MergePolicy::SemicolonJoin, UnknownTagPolicy::Ignore);
        assert_eq!(mapped.get(b"tpe1").unwrap().value, b"B; A");
    }

    #[test]
    fn unknown_tag_policy_txxx_wraps_unmapped() {
        let entry = TagMapEntry::new("mp3");
        let mut source = TagList::new();
        source.push(Tag::new(b"custom", b"value".to_vec(), 0));
        let mapped = entry.map(&source, MergePolicy::Ignore, UnknownTagPolicy::Txxx);
        assert_eq!(mapped.len(), 1);
        let txxx = mapped.get(b"txxx").unwrap();
        assert_eq!(txxx.value, b"custom=value");
    }

    #[test]
    fn unknown_tag_policy_ignore_drops_unmapped() {
        let entry = TagMapEntry::new("mp3");
        let mut source = TagList::new();
        source.push(Tag::new(b"custom", b"value".to_vec(), 0));
        let mapped = entry.map(&source, MergePolicy::Ignore, UnknownTagPolicy::Ignore);
        assert!(mapped.is_empty());
    }

    #[test]
    fn picture_tag_round_trips() {
        let tag = encode_picture_tag("image/png", b"\x89PNG...", 10);
        assert!(tag.key_eq(PICTURE_TAG_KEY));
        let (mime, bytes) = decode_picture_tag(&tag).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"\x89PNG...");
    }

    #[test]
    fn tag_map_lookup_by_id() {
        let mut map = TagMap::new();
        map.insert(TagMapEntry::new("a"));
        map.insert(TagMapEntry::new("b"));
        assert!(map.get("a").is_some());
        assert!(map.get("missing").is_none());
    }
}
