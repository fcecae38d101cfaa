use crate::error::IngestError;
use lopdf::Document;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    /// Returns the non-empty pages of `bytes` in page order.
    fn extract_pages(&self, source_name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;

    /// Page texts joined by a newline. Pages without text contribute nothing.
    fn extract_text(&self, source_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let pages = self.extract_pages(source_name, bytes)?;
        Ok(join_pages(&pages))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, source_name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(bytes).map_err(|error| IngestError::UnreadableDocument {
            source_name: source_name.to_string(),
            reason: error.to_string(),
        })?;

        let page_numbers: Vec<u32> = document.get_pages().into_keys().collect();
        if page_numbers.is_empty() {
            return Err(IngestError::UnreadableDocument {
                source_name: source_name.to_string(),
                reason: "document has no page tree".to_string(),
            });
        }

        let mut pages = Vec::new();
        let mut failed = 0usize;
        for page_no in &page_numbers {
            match document.extract_text(&[*page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                    number: *page_no,
                    text,
                }),
                Ok(_) => {}
                Err(error) => {
                    failed += 1;
                    warn!(source = source_name, page = page_no, %error, "skipping unreadable page");
                }
            }
        }

        if failed == page_numbers.len() {
            return Err(IngestError::UnreadableDocument {
                source_name: source_name.to_string(),
                reason: format!("none of {} pages could be decoded", page_numbers.len()),
            });
        }

        Ok(pages)
    }
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.trim_end_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Builds a PDF with one page per entry; `None` pages have no text operators.
    pub(crate) fn pdf_with_pages(pages: &[Option<&str>]) -> Vec<u8> {
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

        let mut kids = Vec::new();
        for text in pages {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => Vec::new(),
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let bytes = pdf_with_pages(&[Some("Annual leave"), Some("Sick leave")]);
        let text = LopdfExtractor.extract_text("policy.pdf", &bytes).unwrap();

        let first = text.find("Annual leave").expect("first page text");
        let second = text.find("Sick leave").expect("second page text");
        assert!(first < second);
        assert!(text.contains('\n'));
    }

    #[test]
    fn blank_pages_are_skipped() {
        let bytes = pdf_with_pages(&[Some("Annual leave"), None, Some("Sick leave")]);
        let pages = LopdfExtractor.extract_pages("policy.pdf", &bytes).unwrap();

        let numbers: Vec<u32> = pages.iter().map(|page| page.number).collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn corrupt_pdf_is_unreadable() {
        let error = LopdfExtractor
            .extract_text("broken.pdf", b"%PDF-1.4\n%broken")
            .unwrap_err();

        match error {
            IngestError::UnreadableDocument { source_name, .. } => assert_eq!(source_name, "broken.pdf"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn join_skips_nothing_but_separates_pages() {
        let pages = vec![
            PageText {
                number: 1,
                text: "one\n".to_string(),
            },
            PageText {
                number: 2,
                text: "two".to_string(),
            },
        ];
        assert_eq!(join_pages(&pages), "one\ntwo");
    }
}
