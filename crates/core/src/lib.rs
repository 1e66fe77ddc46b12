pub mod capture;
pub mod detection;
pub mod feedback;
pub mod imaging;
pub mod pipeline;
pub mod recognition;
pub mod shared;
pub mod storage;
