//! GDI screen capture of virtual-desktop regions.

use anyhow::{anyhow, Result};
use image::RgbImage;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};

use super::frames::{CaptureBackend, FrameSource, Region};

/// Opens `GdiCapture` sources.
pub struct GdiBackend;

impl CaptureBackend for GdiBackend {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(GdiCapture::default()))
    }
}

/// Copies screen pixels with `BitBlt` and reads them back as top-down BGRA.
#[derive(Default)]
pub struct GdiCapture {
    scratch: Vec<u8>,
}

impl FrameSource for GdiCapture {
    fn capture(&mut self, region: &Region) -> Result<RgbImage> {
        let width = region.width as i32;
        let height = region.height as i32;
        self.scratch.resize(region.width as usize * region.height as usize * 4, 0);

        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return Err(anyhow!("GetDC failed"));
            }
            let mem_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let previous = SelectObject(mem_dc, bitmap);

            let blit = BitBlt(
                mem_dc,
                0,
                0,
                width,
                height,
                screen_dc,
                region.left,
                region.top,
                SRCCOPY,
            );

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height: top-down rows
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = if blit.is_ok() {
                GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(self.scratch.as_mut_ptr() as *mut _),
                    &mut info,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(HWND::default(), screen_dc);

            blit.map_err(|e| anyhow!("BitBlt failed: {}", e))?;
            if lines != height {
                return Err(anyhow!("GetDIBits copied {} of {} rows", lines, height));
            }
        }

        // BGRA -> RGB, alpha discarded
        let rgb: Vec<u8> = self
            .scratch
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        RgbImage::from_raw(region.width, region.height, rgb)
            .ok_or_else(|| anyhow!("Capture buffer size mismatch"))
    }
}
