//! 栅格化输出
//!
//! 运行时绑定 pdfium 动态库，把整个文档逐页渲染为固定 DPI 的 PNG，
//! 并在命中区域填充不透明黑色。像素输出不携带任何文本层，命中
//! 区域外扩 2px 涂黑。

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use pdfium_render::prelude::*;

use crate::error::PdfError;
use crate::types::BBox;

/// 黑框在像素坐标下的外扩量
const FILL_PADDING_PX: i32 = 2;

/// pdfium 动态库的候选目录，环境变量优先
fn pdfium_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(dir) = std::env::var("SUMI_PDFIUM_PATH") {
        paths.push(PathBuf::from(dir));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());
        }
    }
    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

/// 逐个候选目录尝试绑定，最后退回系统库
pub(crate) fn bind_pdfium() -> Result<Pdfium, PdfError> {
    for path in pdfium_search_paths() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&path);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::info!("[Render] 从 {:?} 加载 pdfium", path);
            return Ok(Pdfium::new(bindings));
        }
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PdfError::Render(format!("pdfium 动态库不可用: {}", e)))
}

/// 渲染全部页面为 PNG，masks_by_page 中列出的区域涂黑
pub fn render_pages_png(
    pdf_bytes: &[u8],
    masks_by_page: &BTreeMap<usize, Vec<BBox>>,
    dpi: u32,
) -> Result<Vec<Vec<u8>>, PdfError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| PdfError::Render(format!("pdfium 加载文档失败: {}", e)))?;
    let scale = dpi as f32 / 72.0;

    let mut images = Vec::new();
    for (page_index, page) in document.pages().iter().enumerate() {
        let page_width = page.width().value;
        let page_height = page.height().value;
        let target_width = (page_width * scale).round() as i32;
        let target_height = (page_height * scale).round() as i32;
        let config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_target_height(target_height);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PdfError::Render(format!("页 {} 渲染失败: {}", page_index + 1, e)))?;
        let mut image = bitmap.as_image().to_rgba8();

        if let Some(boxes) = masks_by_page.get(&page_index) {
            for b in boxes {
                fill_black(&mut image, b, page_height, scale);
            }
            log::info!(
                "[Render] 页 {} 涂黑 {} 处，输出 {}x{} 像素",
                page_index + 1,
                boxes.len(),
                image.width(),
                image.height()
            );
        }

        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        images.push(buf);
    }
    Ok(images)
}

/// PDF 坐标（原点左下）换算到图像坐标（原点左上）后涂黑
fn fill_black(image: &mut RgbaImage, b: &BBox, page_height: f32, scale: f32) {
    let x = (b.x * scale).round() as i32 - FILL_PADDING_PX;
    let y = ((page_height - b.y - b.h) * scale).round() as i32 - FILL_PADDING_PX;
    let w = (b.w * scale).round() as i32 + FILL_PADDING_PX * 2;
    let h = (b.h * scale).round() as i32 + FILL_PADDING_PX * 2;
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(image.width() as i32);
    let y1 = (y + h).min(image.height() as i32);
    if x1 > x0 && y1 > y0 {
        draw_filled_rect_mut(
            image,
            Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32),
            Rgba([0u8, 0u8, 0u8, 255u8]),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdoc;

    #[test]
    fn fill_clamps_to_image_edges() {
        let mut image = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        // 区域超出左下角，换算后截断到图像内
        let b = BBox::new(-10.0, -10.0, 20.0, 20.0);
        fill_black(&mut image, &b, 100.0, 1.0);
        assert_eq!(image.get_pixel(0, 99), &Rgba([0, 0, 0, 255]));
        assert_eq!(image.get_pixel(50, 50), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn renders_and_masks_when_pdfium_available() {
        if bind_pdfium().is_err() {
            eprintln!("pdfium 动态库不可用，跳过渲染测试");
            return;
        }
        let mut doc = testdoc::single_page(&[(100.0, 700.0, "secret")]);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let mut masks = BTreeMap::new();
        masks.insert(0usize, vec![BBox::new(100.0, 700.0, 40.0, 12.0)]);
        let images = render_pages_png(&bytes, &masks, 150).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(&images[0][..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&images[0]).unwrap().to_rgba8();
        // 612pt 页宽在 150 DPI 下为 1275px
        assert_eq!(decoded.width(), 1275);
        // 命中区域中心应为纯黑
        let cx = ((100.0 + 20.0) * 150.0 / 72.0) as u32;
        let cy = ((792.0 - 706.0) * 150.0 / 72.0) as u32;
        assert_eq!(decoded.get_pixel(cx, cy), &Rgba([0, 0, 0, 255]));
    }
}
