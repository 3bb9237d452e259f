//! Plain-text extraction from PDF content streams via `lopdf`.

use lopdf::content::Content;
use lopdf::{Document, Object};

use crate::error::AppError;

/// Kerning offsets (thousandths of an em) below this inside a `TJ` array are
/// treated as word gaps.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Extract the text of every page in order.
///
/// Only the text-showing operators (`Tj`, `TJ`, `'`, `"`) contribute; each
/// becomes one line. Strings are read as UTF-8 when valid, otherwise as
/// Latin-1. An unreadable file yields [`AppError::UnextractableDocument`].
pub fn extract_text(bytes: &[u8]) -> Result<String, AppError> {
    let doc = Document::load_mem(bytes).map_err(|e| {
        tracing::debug!(error = %e, "pdf parse failed");
        AppError::UnextractableDocument
    })?;

    let mut out = String::new();
    for page_id in doc.get_pages().into_values() {
        let raw = match doc.get_page_content(page_id) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(?page_id, error = %e, "skipping unreadable page");
                continue;
            }
        };
        let content = match Content::decode(&raw) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(?page_id, error = %e, "skipping undecodable content stream");
                continue;
            }
        };
        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" | "'" | "\"" => {
                    if let Some(Object::String(s, _)) = op.operands.last() {
                        out.push_str(&decode_string(s));
                        out.push('\n');
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        for item in items {
                            match item {
                                Object::String(s, _) => out.push_str(&decode_string(s)),
                                Object::Integer(n) if (*n as f32) < TJ_SPACE_THRESHOLD => out.push(' '),
                                Object::Real(n) if *n < TJ_SPACE_THRESHOLD => out.push(' '),
                                _ => {}
                            }
                        }
                        out.push('\n');
                    }
                }
                _ => {}
            }
        }
    }
    Ok(out)
}

fn decode_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{Stream, dictionary};

    /// Build a minimal PDF with one page per entry; an empty entry produces a
    /// page with a text object but nothing shown.
    pub(crate) fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
            ];
            if !text.is_empty() {
                operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            }
            operations.push(Operation::new("ET", vec![]));
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn extracts_pages_in_order() {
        let bytes = pdf_with_pages(&["Library hours", "Dormitory rules"]);
        let text = extract_text(&bytes).unwrap();
        let lib = text.find("Library hours").unwrap();
        let dorm = text.find("Dormitory rules").unwrap();
        assert!(lib < dorm);
    }

    #[test]
    fn textless_pdf_extracts_nothing() {
        let bytes = pdf_with_pages(&[""]);
        assert!(extract_text(&bytes).unwrap().trim().is_empty());
    }

    #[test]
    fn garbage_is_unextractable() {
        assert!(matches!(extract_text(b"not a pdf"), Err(AppError::UnextractableDocument)));
    }

    #[test]
    fn latin1_fallback() {
        assert_eq!(decode_string(&[0x43, 0x61, 0x66, 0xE9]), "Café");
    }
}
