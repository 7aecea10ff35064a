//! Property Codec: wire encodings of the protocol's property values.
//!
//! Decoders are best-effort. They return `None` for values that are missing or malformed and the
//! caller decides whether that resets or keeps the cached field.
use tracing::trace;

use crate::{model::ON_ALL_DESKTOPS_WIRE, Icon, Point, Property, Rect, Size, Strut, Window, ON_ALL_DESKTOPS};

/// Largest icon edge product accepted from the wire
const MAX_ICON_PIXELS: u64 = 1024 * 1024;

/// Decoding outcome distinguishing an absent property from a malformed one
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decoded<T> {
    Absent,
    Malformed,
    Value(T),
}

impl<T> Decoded<T> {
    /// Apply the cache policy: absent resets to the default, malformed keeps the old value
    pub(crate) fn apply(self, field: &mut T)
    where
        T: Default,
    {
        match self {
            Decoded::Absent => *field = T::default(),
            Decoded::Malformed => (),
            Decoded::Value(val) => *field = val,
        }
    }

    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Absent => Decoded::Absent,
            Decoded::Malformed => Decoded::Malformed,
            Decoded::Value(val) => Decoded::Value(f(val)),
        }
    }
}

/// Format 32 words of the expected type. `min` is the smallest acceptable item count.
pub(crate) fn words(prop: &Option<Property>, type_: u32, min: usize) -> Decoded<Vec<u32>> {
    match prop {
        None => Decoded::Absent,
        Some(prop) => match prop.words(type_) {
            Some(x) if x.len() >= min => Decoded::Value(x.to_vec()),
            _ => Decoded::Malformed,
        },
    }
}

pub(crate) fn cardinal(prop: &Option<Property>, type_: u32) -> Decoded<u32> {
    words(prop, type_, 1).map(|x| x[0])
}

/// UTF-8 text. Invalid UTF-8 is malformed and an empty value counts as absent.
pub(crate) fn utf8(prop: &Option<Property>, utf8_string: u32) -> Decoded<String> {
    match prop {
        None => Decoded::Absent,
        Some(prop) => match prop.bytes(utf8_string) {
            Some([]) => Decoded::Absent,
            Some(x) => match std::str::from_utf8(x) {
                Ok(val) => Decoded::Value(val.to_string()),
                Err(_) => Decoded::Malformed,
            },
            None => Decoded::Malformed,
        },
    }
}

/// Legacy ICCCM text, Latin-1 `STRING` or `UTF8_STRING`
pub(crate) fn legacy_text(prop: &Option<Property>, string: u32, utf8_string: u32) -> Decoded<String> {
    match prop {
        None => Decoded::Absent,
        Some(p) if p.type_ == utf8_string => utf8(prop, utf8_string),
        Some(p) => match p.bytes(string) {
            Some([]) => Decoded::Absent,
            Some(x) => Decoded::Value(x.iter().map(|b| *b as char).collect()),
            None => Decoded::Malformed,
        },
    }
}

/// NUL separated desktop names, exactly `count` entries padded with empty names
pub fn encode_desktop_names(names: &[String], count: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..count {
        if let Some(name) = names.get(i) {
            buf.extend_from_slice(name.as_bytes());
        }
        buf.push(0);
    }
    buf
}

/// Split NUL separated names, ignoring the empty piece after a trailing NUL
pub fn decode_desktop_names(buf: &[u8]) -> Vec<String> {
    let mut names: Vec<String> = buf.split(|b| *b == 0).map(|x| String::from_utf8_lossy(x).into_owned()).collect();
    if buf.last() == Some(&0) || buf.is_empty() {
        names.pop();
    }
    names
}

/// Flatten icons into the `(w, h, pixels..)*` wire layout
pub fn encode_icons(icons: &[Icon]) -> Vec<u32> {
    let mut buf = Vec::with_capacity(icons.iter().map(|x| x.data.len() + 2).sum());
    for icon in icons {
        buf.push(icon.size.width);
        buf.push(icon.size.height);
        buf.extend_from_slice(&icon.data);
    }
    buf
}

/// Parse the `(w, h, pixels..)*` layout
///
/// Decoding stops at the first icon that is empty, oversized or truncated; icons before it are
/// kept. Nothing decoded at all is reported as `None`.
pub fn decode_icons(buf: &[u32]) -> Option<Vec<Icon>> {
    let mut icons = Vec::new();
    let mut rest = buf;
    while rest.len() >= 2 {
        let (width, height) = (rest[0], rest[1]);
        let pixels = width as u64 * height as u64;
        if pixels == 0 || pixels > MAX_ICON_PIXELS || pixels > (rest.len() - 2) as u64 {
            trace!("decode_icons: bad icon: {}x{} with {} words left", width, height, rest.len() - 2);
            break;
        }
        let end = 2 + pixels as usize;
        icons.push(Icon::new(Size::new(width, height), rest[2..end].to_vec()));
        rest = &rest[end..];
    }
    if icons.is_empty() {
        None
    } else {
        Some(icons)
    }
}

pub fn encode_strut(strut: &Strut) -> Vec<u32> {
    vec![strut.left, strut.right, strut.top, strut.bottom]
}

pub fn decode_strut(buf: &[u32]) -> Option<Strut> {
    match buf {
        [left, right, top, bottom, ..] => Some(Strut::new(*left, *right, *top, *bottom)),
        _ => None,
    }
}

pub fn encode_rect(rect: &Rect) -> Vec<u32> {
    vec![rect.x as u32, rect.y as u32, rect.width, rect.height]
}

pub fn decode_rect(buf: &[u32]) -> Option<Rect> {
    match buf {
        [x, y, width, height, ..] => Some(Rect::new(*x as i32, *y as i32, *width, *height)),
        _ => None,
    }
}

/// Consecutive `(x, y)` pairs, a trailing odd word is ignored
pub fn decode_points(buf: &[u32]) -> Vec<Point> {
    buf.chunks_exact(2).map(|x| Point::new(x[0] as i32, x[1] as i32)).collect()
}

/// Consecutive `(x, y, w, h)` quadruples, a trailing partial group is ignored
pub fn decode_rects(buf: &[u32]) -> Vec<Rect> {
    buf.chunks_exact(4).filter_map(decode_rect).collect()
}

/// One-based window desktop to wire, `None` for the unset desktop 0
pub fn desktop_to_wire(desktop: i32) -> Option<u32> {
    match desktop {
        ON_ALL_DESKTOPS => Some(ON_ALL_DESKTOPS_WIRE),
        d if d > 0 => Some((d - 1) as u32),
        _ => None,
    }
}

/// Wire window desktop to one-based
pub fn desktop_from_wire(val: u32) -> i32 {
    if val == ON_ALL_DESKTOPS_WIRE {
        ON_ALL_DESKTOPS
    } else {
        (val.min(i32::MAX as u32 - 1) + 1) as i32
    }
}

/// Sort and drop duplicates, the invariant kept for the client list
pub fn sorted_unique(mut ids: Vec<Window>) -> Vec<Window> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Drop duplicates keeping the first occurrence, the invariant kept for stacking order
pub fn unique_in_order(ids: &[Window]) -> Vec<Window> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|x| seen.insert(*x)).collect()
}

/// One difference between two id lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDiff {
    Added(Window),
    Removed(Window),
}

/// Linear merge of two sorted id lists, calling back for each addition and removal
///
/// Both inputs must be sorted ascending and duplicate free.
pub fn diff_sorted(old: &[Window], new: &[Window], mut f: impl FnMut(ListDiff)) {
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            i += 1;
            j += 1;
        } else if old[i] < new[j] {
            f(ListDiff::Removed(old[i]));
            i += 1;
        } else {
            f(ListDiff::Added(new[j]));
            j += 1;
        }
    }
    old[i..].iter().for_each(|x| f(ListDiff::Removed(*x)));
    new[j..].iter().for_each(|x| f(ListDiff::Added(*x)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyValue;

    #[test]
    fn test_desktop_translation() {
        assert_eq!(desktop_to_wire(1), Some(0));
        assert_eq!(desktop_to_wire(4), Some(3));
        assert_eq!(desktop_to_wire(ON_ALL_DESKTOPS), Some(0xFFFF_FFFF));
        assert_eq!(desktop_to_wire(0), None);
        assert_eq!(desktop_from_wire(0), 1);
        assert_eq!(desktop_from_wire(0xFFFF_FFFF), ON_ALL_DESKTOPS);
    }

    #[test]
    fn test_desktop_names() {
        let names = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        assert_eq!(encode_desktop_names(&names, 2), b"one\0two\0".to_vec());
        assert_eq!(encode_desktop_names(&names[..1], 3), b"one\0\0\0".to_vec());
        assert_eq!(decode_desktop_names(b"one\0two\0"), vec!["one", "two"]);
        assert_eq!(decode_desktop_names(b"one\0two"), vec!["one", "two"]);
        assert_eq!(decode_desktop_names(b"\0x\0"), vec!["", "x"]);
        assert!(decode_desktop_names(b"").is_empty());
    }

    #[test]
    fn test_icons() {
        let icons = vec![Icon::new(Size::new(1, 2), vec![7, 8]), Icon::new(Size::new(2, 1), vec![9, 10])];
        let buf = encode_icons(&icons);
        assert_eq!(buf, vec![1, 2, 7, 8, 2, 1, 9, 10]);
        assert_eq!(decode_icons(&buf), Some(icons.clone()));

        // second icon claims more pixels than remain
        let mut truncated = encode_icons(&icons[..1]);
        truncated.extend_from_slice(&[100, 100, 1, 2, 3]);
        assert_eq!(decode_icons(&truncated), Some(icons[..1].to_vec()));

        let mut bad = vec![100, 100];
        bad.extend(std::iter::repeat(0).take(8));
        assert_eq!(decode_icons(&bad), None);
        assert_eq!(decode_icons(&[0, 5]), None);
        assert_eq!(decode_icons(&[2048, 2048]), None);
    }

    #[test]
    fn test_icons_stop_at_bad_trailing_entry() {
        let icons = vec![
            Icon::new(Size::new(1, 1), vec![1]),
            Icon::new(Size::new(2, 2), vec![2, 3, 4, 5]),
            Icon::new(Size::new(1, 3), vec![6, 7, 8]),
        ];
        let mut buf = encode_icons(&icons);
        buf.extend_from_slice(&[0, 4, 9, 9, 9, 9]);
        buf.extend_from_slice(&encode_icons(&icons[..1]));
        assert_eq!(decode_icons(&buf), Some(icons.clone()));

        // a lone width word after the last icon
        let mut dangling = encode_icons(&icons);
        dangling.push(16);
        assert_eq!(decode_icons(&dangling), Some(icons));
    }

    #[test]
    fn test_strut_and_rect() {
        assert_eq!(decode_strut(&encode_strut(&Strut::new(1, 2, 3, 4))), Some(Strut::new(1, 2, 3, 4)));
        assert_eq!(decode_strut(&[1, 2, 3]), None);
        assert_eq!(decode_rect(&[(-5i32) as u32, 0, 10, 10]), Some(Rect::new(-5, 0, 10, 10)));
        assert_eq!(decode_rects(&[0, 0, 10, 10, 5, 5, 1]), vec![Rect::new(0, 0, 10, 10)]);
        assert_eq!(decode_points(&[1, 2, 3]), vec![Point::new(1, 2)]);
    }

    #[test]
    fn test_decoded_policy() {
        let mut field = 9u32;
        cardinal(&None, 6).apply(&mut field);
        assert_eq!(field, 0);

        field = 9;
        let wrong_type = Some(Property::new(33, PropertyValue::Format32(vec![3])));
        cardinal(&wrong_type, 6).apply(&mut field);
        assert_eq!(field, 9);

        let good = Some(Property::new(6, PropertyValue::Format32(vec![3])));
        cardinal(&good, 6).apply(&mut field);
        assert_eq!(field, 3);

        let empty = Some(Property::new(6, PropertyValue::Format32(vec![])));
        cardinal(&empty, 6).apply(&mut field);
        assert_eq!(field, 3);
    }

    #[test]
    fn test_text() {
        let good = Some(Property::new(50, PropertyValue::Format8("héllo".as_bytes().to_vec())));
        assert_eq!(utf8(&good, 50), Decoded::Value("héllo".to_string()));
        let invalid = Some(Property::new(50, PropertyValue::Format8(vec![0xff, 0xfe])));
        assert_eq!(utf8(&invalid, 50), Decoded::Malformed);
        let blank = Some(Property::new(50, PropertyValue::Format8(vec![])));
        assert_eq!(utf8(&blank, 50), Decoded::Absent);
        let latin1 = Some(Property::new(31, PropertyValue::Format8(vec![b'c', 0xe9])));
        assert_eq!(legacy_text(&latin1, 31, 50), Decoded::Value("cé".to_string()));
        assert_eq!(legacy_text(&good, 31, 50), Decoded::Value("héllo".to_string()));
    }

    #[test]
    fn test_diff_sorted() {
        let mut diffs = vec![];
        diff_sorted(&[1, 3, 5, 7], &[3, 4, 7, 9], |x| diffs.push(x));
        assert_eq!(diffs, vec![ListDiff::Removed(1), ListDiff::Added(4), ListDiff::Removed(5), ListDiff::Added(9)]);

        let mut diffs = vec![];
        diff_sorted(&[], &[4, 5], |x| diffs.push(x));
        assert_eq!(diffs, vec![ListDiff::Added(4), ListDiff::Added(5)]);
    }

    #[test]
    fn test_list_invariants() {
        assert_eq!(sorted_unique(vec![9, 5, 9, 1]), vec![1, 5, 9]);
        assert_eq!(unique_in_order(&[9, 5, 9, 1]), vec![9, 5, 1]);
    }
}
