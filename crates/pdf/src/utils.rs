//! lopdf 文档访问辅助函数

use lopdf::{Document, Object, ObjectId, Stream};

use crate::error::PdfError;
use crate::types::BBox;

/// 从内存加载 PDF 文档
pub fn load_document(bytes: &[u8]) -> Result<Document, PdfError> {
    let doc = Document::load_mem(bytes)?;
    log::debug!("[Extract] 文档加载完成，共 {} 页", doc.page_iter().count());
    Ok(doc)
}

/// 序列化文档到内存
///
/// 写出前先剔除从 trailer 不可达的对象，再压缩内容流。脱敏替换
/// 下来的旧内容流属于不可达对象，不随输出字节写出。
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, PdfError> {
    doc.prune_objects();
    doc.compress();
    let mut buf = Vec::new();
    doc.save_to(&mut buf)?;
    Ok(buf)
}

/// 按索引取页面对象 ID
pub(crate) fn page_id_at(doc: &Document, page_index: usize) -> Result<ObjectId, PdfError> {
    doc.page_iter()
        .nth(page_index)
        .ok_or(PdfError::PageNotFound(page_index))
}

/// 数值对象转 f32
pub(crate) fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// 取流内容，压缩流自动解压
pub(crate) fn get_stream_content(stream: &Stream) -> Vec<u8> {
    match stream.decompressed_content() {
        Ok(data) => data,
        Err(_) => stream.content.clone(),
    }
}

/// 取页面的完整内容流，Contents 为数组时按顺序拼接
///
/// 页面没有 Contents 时返回空，视为无文本页。
pub(crate) fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, PdfError> {
    let page_dict = match doc.get_object(page_id).and_then(|obj| obj.as_dict()) {
        Ok(dict) => dict,
        Err(_) => return Ok(Vec::new()),
    };
    let contents = match page_dict.get(b"Contents") {
        Ok(obj) => obj,
        Err(_) => return Ok(Vec::new()),
    };

    let mut data = Vec::new();
    match contents {
        Object::Reference(id) => {
            if let Ok(Object::Stream(stream)) = doc.get_object(*id) {
                data = get_stream_content(stream);
            }
        }
        Object::Stream(stream) => {
            data = get_stream_content(stream);
        }
        Object::Array(items) => {
            for item in items {
                if let Object::Reference(id) = item {
                    if let Ok(Object::Stream(stream)) = doc.get_object(*id) {
                        data.extend_from_slice(&get_stream_content(stream));
                        data.push(b'\n');
                    }
                }
            }
        }
        _ => {}
    }
    Ok(data)
}

/// 页面范围：CropBox 优先，其次 MediaBox，再向父节点继承，
/// 都取不到时退回 Letter 尺寸
pub(crate) fn get_page_bounds(doc: &Document, page_id: ObjectId) -> BBox {
    if let Ok(page_dict) = doc.get_object(page_id).and_then(|obj| obj.as_dict()) {
        for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
            if let Some(bbox) = page_dict.get(key).ok().and_then(|obj| rect_from(doc, obj)) {
                return bbox;
            }
        }
        // 继承父 Pages 节点上的 MediaBox
        if let Ok(Object::Reference(parent_id)) = page_dict.get(b"Parent") {
            if let Ok(parent_dict) = doc.get_object(*parent_id).and_then(|obj| obj.as_dict()) {
                if let Some(bbox) = parent_dict
                    .get(b"MediaBox")
                    .ok()
                    .and_then(|obj| rect_from(doc, obj))
                {
                    return bbox;
                }
            }
        }
    }
    BBox::new(0.0, 0.0, 612.0, 792.0)
}

/// 把 `[llx lly urx ury]` 数组解析成矩形
fn rect_from(doc: &Document, obj: &Object) -> Option<BBox> {
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = get_number(&arr[0])?;
    let lly = get_number(&arr[1])?;
    let urx = get_number(&arr[2])?;
    let ury = get_number(&arr[3])?;
    Some(BBox::new(llx, lly, urx - llx, ury - lly))
}
