use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::overlay::domain::overlay::Overlay;
use crate::overlay::domain::overlay_surface::{OverlaySurface, RenderError};
use crate::overlay::infrastructure::raster_surface::RasterSurface;
use crate::shared::frame::Frame;

/// Renders into a [`RasterSurface`] and publishes each picture as an image
/// file, so an external viewer can follow the overlay.
///
/// Files are written next to the target and renamed into place; readers
/// never see a half-written image. Clearing the surface removes the file.
pub struct ImageFileSurface {
    raster: RasterSurface,
    path: PathBuf,
    format: ImageFormat,
}

impl ImageFileSurface {
    pub fn new(path: &Path, raster: RasterSurface) -> Result<Self, image::ImageError> {
        let format = ImageFormat::from_path(path)?;
        Ok(Self {
            raster,
            path: path.to_path_buf(),
            format,
        })
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{name}.part"))
    }
}

impl OverlaySurface for ImageFileSurface {
    fn is_ready(&self) -> bool {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
            _ => true,
        }
    }

    fn render(&mut self, frame: &Frame, overlay: &Overlay) -> Result<(), RenderError> {
        self.raster.render(frame, overlay)?;
        let Some(img) = self.raster.image() else {
            return Ok(());
        };

        let temp = self.temp_path();
        img.save_with_format(&temp, self.format)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.raster.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::domain::face_box::{BoxRect, FaceBox};

    fn frame() -> Frame {
        Frame::new(vec![80u8; 40 * 30 * 3], 40, 30, 0)
    }

    fn overlay() -> Overlay {
        Overlay::from_faces(&[FaceBox {
            rect: BoxRect {
                x: 5.0,
                y: 25.0,
                width: 20.0,
                height: 4.0,
            },
            label: "Alice".to_string(),
            score: 0.5,
        }])
    }

    #[test]
    fn test_render_writes_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.png");
        let mut surface = ImageFileSurface::new(&path, RasterSurface::new()).unwrap();

        surface.render(&frame(), &overlay()).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (40, 30));
        assert_eq!(img.get_pixel(10, 10).0, [0, 255, 0]); // label band
        assert_eq!(img.get_pixel(35, 2).0, [80, 80, 80]);
    }

    #[test]
    fn test_render_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.png");
        let mut surface = ImageFileSurface::new(&path, RasterSurface::new()).unwrap();
        surface.render(&frame(), &overlay()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(!surface.temp_path().exists());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.jpg");
        let mut surface = ImageFileSurface::new(&path, RasterSurface::new()).unwrap();
        surface.render(&frame(), &overlay()).unwrap();
        assert!(path.exists());

        surface.clear();
        assert!(!path.exists());
        // Idempotent
        surface.clear();
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = ImageFileSurface::new(Path::new("/tmp/out.unknownext"), RasterSurface::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_not_ready_when_directory_missing() {
        let surface =
            ImageFileSurface::new(Path::new("/nonexistent/dir/live.png"), RasterSurface::new())
                .unwrap();
        assert!(!surface.is_ready());
    }
}
