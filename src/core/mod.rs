pub mod audio;
pub mod realtime;
