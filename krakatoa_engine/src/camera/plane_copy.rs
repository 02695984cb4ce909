/// Copy a strided source plane into a tightly packed staging buffer.
///
/// Three shapes are handled:
///
/// - packed rows and texels: one straight copy
/// - padded rows, packed texels: one copy per row
/// - spaced texels (`pixel_stride > texel_bytes`): gather texel by texel

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Texels per row
    pub width: usize,
    pub height: usize,
    /// Bytes between the starts of two rows
    pub row_stride: usize,
    /// Bytes between the starts of two texels
    pub pixel_stride: usize,
    /// Bytes per destination texel
    pub texel_bytes: usize,
}

impl PlaneLayout {
    fn row_bytes(&self) -> usize {
        self.width * self.texel_bytes
    }

    /// Size of the packed destination
    pub fn packed_len(&self) -> usize {
        self.row_bytes() * self.height
    }

    /// Bytes of a source row actually read
    fn source_row_span(&self) -> usize {
        (self.width - 1) * self.pixel_stride + self.texel_bytes
    }

    /// Smallest source slice holding the whole plane
    pub fn required_len(&self) -> usize {
        (self.height - 1) * self.row_stride + self.source_row_span()
    }

    pub fn validate(&self, source_len: usize) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidResource("empty plane".to_string()));
        }
        if self.pixel_stride < self.texel_bytes {
            return Err(Error::InvalidResource(format!(
                "pixel stride {} smaller than texel size {}",
                self.pixel_stride, self.texel_bytes
            )));
        }
        if self.row_stride < self.source_row_span() {
            return Err(Error::InvalidResource(format!(
                "row stride {} shorter than a {} byte row",
                self.row_stride,
                self.source_row_span()
            )));
        }
        if source_len < self.required_len() {
            return Err(Error::InvalidResource(format!(
                "plane needs {} bytes, got {}",
                self.required_len(),
                source_len
            )));
        }
        Ok(())
    }
}

/// Pack `src` into the start of `dst`
pub fn copy_plane(src: &[u8], layout: PlaneLayout, dst: &mut [u8]) -> Result<()> {
    layout.validate(src.len())?;
    let packed = layout.packed_len();
    if dst.len() < packed {
        return Err(Error::InvalidResource(format!(
            "staging buffer of {} bytes for a {} byte plane",
            dst.len(),
            packed
        )));
    }

    let row_bytes = layout.row_bytes();
    if layout.pixel_stride == layout.texel_bytes {
        if layout.row_stride == row_bytes {
            dst[..packed].copy_from_slice(&src[..packed]);
        } else {
            for (row, out) in dst[..packed].chunks_exact_mut(row_bytes).enumerate() {
                let start = row * layout.row_stride;
                out.copy_from_slice(&src[start..start + row_bytes]);
            }
        }
        return Ok(());
    }

    for (row, out) in dst[..packed].chunks_exact_mut(row_bytes).enumerate() {
        let src_row = &src[row * layout.row_stride..];
        for (col, texel) in out.chunks_exact_mut(layout.texel_bytes).enumerate() {
            let start = col * layout.pixel_stride;
            texel.copy_from_slice(&src_row[start..start + layout.texel_bytes]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(width: usize, height: usize, row_stride: usize, pixel_stride: usize, texel_bytes: usize) -> PlaneLayout {
        PlaneLayout { width, height, row_stride, pixel_stride, texel_bytes }
    }

    #[test]
    fn test_packed_plane_straight_copy() {
        let src: Vec<u8> = (0..12).collect();
        let mut dst = vec![0u8; 12];
        copy_plane(&src, layout(4, 3, 4, 1, 1), &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_padded_rows_dropped() {
        // 3 texels per row, 2 bytes of row padding
        let src = [1, 2, 3, 0xEE, 0xEE, 4, 5, 6, 0xEE, 0xEE];
        let mut dst = vec![0u8; 6];
        copy_plane(&src, layout(3, 2, 5, 1, 1), &mut dst).unwrap();
        assert_eq!(dst, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_last_row_may_omit_padding() {
        let src = [1, 2, 0xEE, 3, 4];
        let mut dst = vec![0u8; 4];
        copy_plane(&src, layout(2, 2, 3, 1, 1), &mut dst).unwrap();
        assert_eq!(dst, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_interleaved_chroma_packed() {
        let src = [10, 20, 11, 21, 12, 22, 13, 23];
        let mut dst = vec![0u8; 8];
        copy_plane(&src, layout(2, 2, 4, 2, 2), &mut dst).unwrap();
        assert_eq!(dst, src.to_vec());
    }

    #[test]
    fn test_spaced_texels_gathered() {
        // U/V pairs every 4 bytes
        let src = [10, 20, 0, 0, 11, 21, 0, 0, 12, 22, 0, 0, 13, 23];
        let mut dst = vec![0u8; 8];
        copy_plane(&src, layout(2, 2, 8, 4, 2), &mut dst).unwrap();
        assert_eq!(dst, vec![10, 20, 11, 21, 12, 22, 13, 23]);
    }

    #[test]
    fn test_short_source_rejected() {
        let mut dst = vec![0u8; 16];
        assert!(copy_plane(&[0; 15], layout(4, 4, 4, 1, 1), &mut dst).is_err());
    }

    #[test]
    fn test_pixel_stride_below_texel_rejected() {
        let mut dst = vec![0u8; 8];
        assert!(copy_plane(&[0; 8], layout(2, 2, 4, 1, 2), &mut dst).is_err());
    }

    #[test]
    fn test_small_destination_rejected() {
        let mut dst = vec![0u8; 3];
        assert!(copy_plane(&[0; 4], layout(2, 2, 2, 1, 1), &mut dst).is_err());
    }
}
