pub mod analysis {
    pub mod domain {
        pub mod face_box;
        pub mod frame_analyzer;
    }
    pub mod infrastructure;
}

pub mod capture {
    pub mod domain {
        pub mod video_source;
    }
    pub mod infrastructure;
}

pub mod overlay {
    pub mod domain {
        pub mod overlay;
        pub mod overlay_surface;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod snapshot_use_case;
}

pub mod realtime {
    pub mod errors;
    mod frame_loop;
    pub mod loop_observer;
    pub mod processor_config;
    pub mod realtime_frame_processor;
    #[cfg(test)]
    pub(crate) mod test_support;

    pub use frame_loop::LoopState;
}

pub mod shared {
    pub mod constants;
    pub mod encoded_frame;
    pub mod frame;
}
