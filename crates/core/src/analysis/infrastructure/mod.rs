pub mod http_frame_analyzer;
