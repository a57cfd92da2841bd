//! Splits HML product text into embedded site documents.

use tracing::debug;

use crate::error::ParseResult;
use crate::site::{parse_site, SiteRecord};

/// Marker each embedded document starts with (minus the leading `<`).
const DOCUMENT_MARKER: &str = "?xml";

/// Characters left at the end of a chunk by the split: the newline and the
/// `<` that opened the next document's declaration.
const TRAILING_ARTIFACT_CHARS: usize = 2;

const SITE_CLOSE_TAG: &str = "</site>";

/// One embedded document: its position in the product and the parse result.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// 1-based index of the document within the product.
    pub index: usize,
    pub record: ParseResult<SiteRecord>,
}

/// Lazy iterator over the documents of a product.
///
/// Yields one item per chunk after the first `?xml` marker. The text before
/// the first marker is the WMO header and is never parsed.
pub struct Splitter<'a> {
    chunks: std::iter::Skip<std::str::Split<'a, &'static str>>,
    index: usize,
}

/// Split product text into its embedded documents.
pub fn split_product(product_text: &str) -> Splitter<'_> {
    Splitter {
        chunks: product_text.split(DOCUMENT_MARKER).skip(1),
        index: 0,
    }
}

impl<'a> Iterator for Splitter<'a> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        self.index += 1;
        Some(Fragment {
            index: self.index,
            record: parse_chunk(chunk),
        })
    }
}

/// Rebuild and parse one chunk, retrying once with the text cut after the
/// last closing `</site>` when the first attempt is not well-formed.
fn parse_chunk(chunk: &str) -> ParseResult<SiteRecord> {
    let document = format!(
        "<{}{}",
        DOCUMENT_MARKER,
        trim_trailing_chars(chunk, TRAILING_ARTIFACT_CHARS)
    );

    match parse_site(&document) {
        Ok(record) => Ok(record),
        Err(err) if err.is_syntax() => {
            let full = format!("<{}{}", DOCUMENT_MARKER, chunk);
            match full.rfind(SITE_CLOSE_TAG) {
                Some(pos) => {
                    debug!(error = %err, "Retrying document truncated at last </site>");
                    parse_site(&full[..pos + SITE_CLOSE_TAG.len()])
                }
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

fn trim_trailing_chars(text: &str, count: usize) -> &str {
    match text.char_indices().rev().nth(count.saturating_sub(1)) {
        Some((idx, _)) if count > 0 => &text[..idx],
        Some(_) => text,
        None => "",
    }
}
