pub mod image_file_surface;
pub mod raster_surface;
