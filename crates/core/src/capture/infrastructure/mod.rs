pub mod ffmpeg_video_source;
pub mod still_image_source;
