pub mod bar;
pub mod instrument;
pub mod interval;
pub mod request_params;
