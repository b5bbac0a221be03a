//! Header cards, keyword lookup, and the plain image header produced after
//! decompression.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::str;

use crate::value::Value;

/// A parsed FITS header card (one 80-byte keyword record).
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// The 8-byte keyword name, ASCII, left-justified, space-padded.
    pub keyword: [u8; 8],
    /// The parsed value, if the card has a value indicator.
    pub value: Option<Value>,
    /// An optional comment string.
    pub comment: Option<String>,
}

impl Card {
    /// Build a valued card with no comment.
    pub fn new(keyword: &str, value: Value) -> Self {
        Card {
            keyword: make_keyword(keyword),
            value: Some(value),
            comment: None,
        }
    }

    /// Return the keyword as a trimmed UTF-8 string.
    pub fn keyword_str(&self) -> &str {
        let end = self
            .keyword
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        str::from_utf8(&self.keyword[..end]).unwrap_or("")
    }

    fn renamed(&self, keyword: &str) -> Self {
        Card {
            keyword: make_keyword(keyword),
            value: self.value.clone(),
            comment: self.comment.clone(),
        }
    }
}

/// Pad a keyword name to the fixed 8-byte card field.
pub fn make_keyword(name: &str) -> [u8; 8] {
    let mut k = [b' '; 8];
    let bytes = name.as_bytes();
    let len = bytes.len().min(8);
    k[..len].copy_from_slice(&bytes[..len]);
    k
}

/// Value of the first card carrying `keyword`.
pub fn find_value<'a>(cards: &'a [Card], keyword: &str) -> Option<&'a Value> {
    cards
        .iter()
        .find(|c| c.keyword_str() == keyword)
        .and_then(|c| c.value.as_ref())
}

pub fn card_integer_value(cards: &[Card], keyword: &str) -> Option<i64> {
    find_value(cards, keyword).and_then(Value::as_integer)
}

pub fn card_float_value(cards: &[Card], keyword: &str) -> Option<f64> {
    find_value(cards, keyword).and_then(Value::as_float)
}

pub fn card_string_value<'a>(cards: &'a [Card], keyword: &str) -> Option<&'a str> {
    find_value(cards, keyword).and_then(Value::as_str)
}

pub fn card_logical_value(cards: &[Card], keyword: &str) -> Option<bool> {
    find_value(cards, keyword).and_then(Value::as_logical)
}

/// Keywords describing the compressed table or the compression itself.
const COMPRESSION_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "PCOUNT", "GCOUNT", "TFIELDS", "THEAP", "EXTEND",
    "CHECKSUM", "DATASUM", "ZIMAGE", "ZCMPTYPE", "ZBITPIX", "ZNAXIS", "ZQUANTIZ", "ZDITHER0",
    "ZBLANK", "ZSIMPLE", "ZTENSION", "END",
];

/// Indexed keywords (`PREFIXn`) that are dropped from the image header.
const COMPRESSION_PREFIXES: &[&str] = &[
    "NAXIS", "TTYPE", "TFORM", "TUNIT", "TNULL", "TSCAL", "TZERO", "TDIM", "TDISP", "ZNAXIS",
    "ZTILE", "ZNAME", "ZVAL",
];

/// Compressed-table keywords that carry the original image's value.
const RESTORED_KEYWORDS: &[(&str, &str)] = &[
    ("ZEXTEND", "EXTEND"),
    ("ZBLOCKED", "BLOCKED"),
    ("ZPCOUNT", "PCOUNT"),
    ("ZGCOUNT", "GCOUNT"),
    ("ZHECKSUM", "CHECKSUM"),
    ("ZDATASUM", "DATASUM"),
];

/// Scaling keywords consumed by the asinh stage.
const LUPTON_KEYWORDS: &[&str] = &["BSOFTEN", "BOFFSET", "BSCALE", "BZERO", "BLANK"];

fn is_indexed(keyword: &str, prefix: &str) -> bool {
    keyword
        .strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn is_compression_keyword(keyword: &str) -> bool {
    COMPRESSION_KEYWORDS.contains(&keyword)
        || COMPRESSION_PREFIXES.iter().any(|p| is_indexed(keyword, p))
}

/// Build the header of the plain image that results from decompression.
///
/// Mandatory keywords come first, followed by the restored `Z*` image
/// keywords and every remaining user card in its original order. When
/// `lupton` is set the asinh scaling keywords are dropped because the pixel
/// values already carry them.
pub fn image_header(cards: &[Card], bitpix: i64, axes: &[usize], lupton: bool) -> Vec<Card> {
    let mut out = Vec::with_capacity(cards.len() + axes.len() + 3);
    out.push(Card::new("SIMPLE", Value::Logical(true)));
    out.push(Card::new("BITPIX", Value::Integer(bitpix)));
    out.push(Card::new("NAXIS", Value::Integer(axes.len() as i64)));
    for (i, &len) in axes.iter().enumerate() {
        out.push(Card::new(&format!("NAXIS{}", i + 1), Value::Integer(len as i64)));
    }

    for card in cards {
        let kw = card.keyword_str();
        if let Some((_, plain)) = RESTORED_KEYWORDS.iter().find(|(z, _)| *z == kw) {
            out.push(card.renamed(plain));
            continue;
        }
        if is_compression_keyword(kw) || (lupton && LUPTON_KEYWORDS.contains(&kw)) {
            continue;
        }
        out.push(card.clone());
    }
    out
}
