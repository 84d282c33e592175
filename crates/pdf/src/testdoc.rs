//! 测试用的最小 PDF 构造辅助

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

/// ASCII 文本用字面量字符串，其余用 UTF-16BE 十六进制字符串
pub(crate) fn pdf_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::string_literal(text)
    } else {
        let bytes: Vec<u8> = text
            .encode_utf16()
            .flat_map(|unit| unit.to_be_bytes())
            .collect();
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// 单页文档，每项为 (x, y, 文本)，各自独立成一个 BT/ET 块
pub(crate) fn single_page(items: &[(f32, f32, &str)]) -> Document {
    pages(&[items])
}

/// 多页文档
pub(crate) fn pages(page_items: &[&[(f32, f32, &str)]]) -> Document {
    let contents = page_items
        .iter()
        .map(|items| {
            let mut operations = Vec::new();
            for (x, y, text) in items.iter() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)],
                ));
                operations.push(Operation::new(
                    "Td",
                    vec![Object::Real(*x), Object::Real(*y)],
                ));
                operations.push(Operation::new("Tj", vec![pdf_string(text)]));
                operations.push(Operation::new("ET", vec![]));
            }
            operations
        })
        .collect();
    build(contents)
}

/// 由裸操作序列构造单页文档
pub(crate) fn from_operations(operations: Vec<Operation>) -> Document {
    build(vec![operations])
}

fn build(page_contents: Vec<Vec<Operation>>) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for operations in page_contents {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
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
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}
