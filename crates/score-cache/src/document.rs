//! Decoded document model
//!
//! Decoding only walks the page tree (page count and page boxes). The raw
//! bytes are kept so a rasterizer can open the document per call and release
//! its native handles before returning.

use crate::types::*;
use lopdf::{Document, Object, ObjectId};
use std::sync::Arc;

/// Page size used when a page tree carries no MediaBox at all (US Letter)
const DEFAULT_PAGE_SIZE: Size = Size {
    width: 612.0,
    height: 792.0,
};

/// Guard against cyclic Parent chains in malformed files
const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct DocumentHandle {
    bytes: Arc<Vec<u8>>,
    pages: Vec<Size>,
}

impl DocumentHandle {
    /// Parse `bytes`, failing with [`CacheError::DecodeFailure`] for corrupt or
    /// empty documents
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let doc = Document::load_mem(&bytes)?;
        let page_ids = doc.get_pages();
        if page_ids.is_empty() {
            return Err(CacheError::DecodeFailure("document has no pages".to_string()));
        }

        let pages = page_ids
            .values()
            .map(|&id| page_size(&doc, id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bytes: Arc::new(bytes),
            pages,
        })
    }

    /// Decode on the blocking pool
    pub async fn decode_async(bytes: Vec<u8>) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::decode(bytes)).await?
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Natural size in points of the 1-based `page_number`, rotation applied
    pub fn page_size(&self, page_number: usize) -> Result<Size> {
        page_number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .copied()
            .ok_or(CacheError::PageOutOfRange {
                page: page_number,
                count: self.pages.len(),
            })
    }

    pub fn bytes(&self) -> &Arc<Vec<u8>> {
        &self.bytes
    }
}

fn page_size(doc: &Document, page_id: ObjectId) -> Result<Size> {
    let media_box = inherited(doc, page_id, b"MediaBox")?;
    let rotate = inherited(doc, page_id, b"Rotate")?
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);

    let size = match media_box {
        Some(obj) => box_size(doc, obj)?,
        None => DEFAULT_PAGE_SIZE,
    };

    if rotate.rem_euclid(180) == 90 {
        Ok(size.rotated())
    } else {
        Ok(size)
    }
}

/// Look up an inheritable page attribute, walking up the page tree
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Result<Option<&'a Object>> {
    let mut current = page_id;
    for _ in 0..MAX_PARENT_DEPTH {
        let dict = doc.get_dictionary(current)?;
        if let Ok(value) = dict.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        match dict.get(b"Parent").and_then(|p| p.as_reference()) {
            Ok(parent) => current = parent,
            Err(_) => return Ok(None),
        }
    }
    Err(CacheError::DecodeFailure("page tree too deep".to_string()))
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn box_size(doc: &Document, obj: &Object) -> Result<Size> {
    let coords = obj.as_array()?;
    if coords.len() != 4 {
        return Err(CacheError::DecodeFailure(format!(
            "page box has {} entries",
            coords.len()
        )));
    }

    let mut n = [0.0f32; 4];
    for (slot, value) in n.iter_mut().zip(coords) {
        *slot = number(resolve(doc, value)?).ok_or_else(|| {
            CacheError::DecodeFailure("page box entry is not a number".to_string())
        })?;
    }

    let size = Size::new((n[2] - n[0]).abs(), (n[3] - n[1]).abs());
    if size.width <= 0.0 || size.height <= 0.0 {
        return Err(CacheError::DecodeFailure("empty page box".to_string()));
    }
    Ok(size)
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_a_decode_failure() {
        let result = DocumentHandle::decode(b"definitely not a pdf".to_vec());
        assert!(matches!(result, Err(CacheError::DecodeFailure(_))));
    }

    #[test]
    fn test_number_accepts_integers_and_reals() {
        assert_eq!(number(&Object::Integer(612)), Some(612.0));
        assert_eq!(number(&Object::Real(1.5)), Some(1.5));
        assert_eq!(number(&Object::Null), None);
    }
}
