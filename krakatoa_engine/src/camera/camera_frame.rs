/// One camera image as delivered by the platform: a full-resolution luma
/// plane and a half-resolution chroma plane with interleaved U/V.

use crate::error::{Error, Result};
use super::plane_copy::PlaneLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraFrame<'a> {
    pub luma: Option<&'a [u8]>,
    pub luma_row_stride: u32,
    pub chroma: Option<&'a [u8]>,
    pub chroma_row_stride: u32,
    /// Distance in bytes between two chroma texels (2 for packed NV12)
    pub chroma_pixel_stride: u32,
    pub width: u32,
    pub height: u32,
    /// False when the camera had no new image this frame
    pub valid: bool,
}

impl<'a> CameraFrame<'a> {
    /// Frame with no camera image
    pub fn invalid() -> Self {
        Self {
            luma: None,
            luma_row_stride: 0,
            chroma: None,
            chroma_row_stride: 0,
            chroma_pixel_stride: 0,
            width: 0,
            height: 0,
            valid: false,
        }
    }

    /// Tightly packed NV12 planes
    pub fn nv12(luma: &'a [u8], chroma: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            luma: Some(luma),
            luma_row_stride: width,
            chroma: Some(chroma),
            chroma_row_stride: width.div_ceil(2) * 2,
            chroma_pixel_stride: 2,
            width,
            height,
            valid: true,
        }
    }

    /// Chroma plane size in texels, half of the luma size rounded up
    pub fn chroma_extent(&self) -> (u32, u32) {
        (self.width.div_ceil(2), self.height.div_ceil(2))
    }

    pub fn luma_layout(&self) -> PlaneLayout {
        PlaneLayout {
            width: self.width as usize,
            height: self.height as usize,
            row_stride: self.luma_row_stride as usize,
            pixel_stride: 1,
            texel_bytes: 1,
        }
    }

    pub fn chroma_layout(&self) -> PlaneLayout {
        let (width, height) = self.chroma_extent();
        PlaneLayout {
            width: width as usize,
            height: height as usize,
            row_stride: self.chroma_row_stride as usize,
            pixel_stride: self.chroma_pixel_stride as usize,
            texel_bytes: 2,
        }
    }

    /// Check the frame can be uploaded as is
    pub fn validate(&self) -> Result<(&'a [u8], &'a [u8])> {
        if !self.valid {
            return Err(Error::InvalidResource("camera frame flagged invalid".to_string()));
        }
        let (Some(luma), Some(chroma)) = (self.luma, self.chroma) else {
            return Err(Error::InvalidResource("camera frame is missing a plane".to_string()));
        };
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidResource(format!(
                "camera frame has empty size {}x{}",
                self.width, self.height
            )));
        }
        self.luma_layout().validate(luma.len())?;
        self.chroma_layout().validate(chroma.len())?;
        Ok((luma, chroma))
    }
}
