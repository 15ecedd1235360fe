//! Small generated PDFs for tests.

use crate::PdfEngineError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs;
use std::path::{Path, PathBuf};

/// `page_count` Letter pages whose MediaBox lives on the page tree root.
pub fn sample_pdf_bytes(page_count: u32) -> Result<Vec<u8>, PdfEngineError> {
    build(&vec![None; page_count as usize])
}

/// One page per entry, each with its own MediaBox of `(width, height)` points.
pub fn sized_pdf_bytes(page_sizes: &[(f32, f32)]) -> Result<Vec<u8>, PdfEngineError> {
    let sizes: Vec<Option<(f32, f32)>> = page_sizes.iter().copied().map(Some).collect();
    build(&sizes)
}

pub fn write_sample_pdf(dir: &Path, name: &str, page_count: u32) -> Result<PathBuf, PdfEngineError> {
    let path = dir.join(name);
    fs::write(&path, sample_pdf_bytes(page_count)?)?;
    Ok(path)
}

pub fn write_sized_pdf(
    dir: &Path,
    name: &str,
    page_sizes: &[(f32, f32)],
) -> Result<PathBuf, PdfEngineError> {
    let path = dir.join(name);
    fs::write(&path, sized_pdf_bytes(page_sizes)?)?;
    Ok(path)
}

pub fn write_corrupt_pdf(dir: &Path, name: &str) -> Result<PathBuf, PdfEngineError> {
    let path = dir.join(name);
    fs::write(&path, b"%PDF-1.5\nthis is not a real document\n")?;
    Ok(path)
}

fn build(pages: &[Option<(f32, f32)>]) -> Result<Vec<u8>, PdfEngineError> {
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

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for (index, size) in pages.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", index + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if let Some((width, height)) = size {
            page.set("MediaBox", vec![0.into(), 0.into(), (*width).into(), (*height).into()]);
        }
        kids.push(doc.add_object(page).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
