//! 渲染图像的可用性检查

use ndarray::ArrayView2;

/// 掩码中物体像素的值
const OBJECT_PIXEL: f32 = 0.0;

/// 检查掩码中物体的像素数量，以及物体是否完整地在图像内。
///
/// - 没有物体像素：不可用
/// - 物体包围框碰到任一图像边界：不可用
/// - 物体像素数 >= `min_object_pixels`：可用
pub fn is_usable(mask: ArrayView2<f32>, min_object_pixels: usize) -> bool {
    let (rows, cols) = mask.dim();
    let mut count = 0usize;
    let (mut min_row, mut min_col) = (usize::MAX, usize::MAX);
    let (mut max_row, mut max_col) = (0usize, 0usize);

    for ((r, c), &v) in mask.indexed_iter() {
        if v == OBJECT_PIXEL {
            count += 1;
            min_row = min_row.min(r);
            min_col = min_col.min(c);
            max_row = max_row.max(r);
            max_col = max_col.max(c);
        }
    }

    if count == 0 {
        return false;
    }
    if min_row == 0 || min_col == 0 || max_row == rows - 1 || max_col == cols - 1 {
        return false;
    }
    count >= min_object_pixels
}
