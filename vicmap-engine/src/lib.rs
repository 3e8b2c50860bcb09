pub mod aoi;
pub mod assemble;
pub mod clip;
pub mod flood;
pub mod labels;
pub mod merge;
pub mod naming;
pub mod pipeline;
pub mod request;
pub mod roads;
pub mod scale;

pub mod errors {
    use thiserror::Error;
    use vicmap_core::crs::CrsError;

    use crate::aoi::AoiError;
    use crate::request::RequestError;

    /// 出图流程的致命错误；其余问题在各阶段内降级处理并记录日志。
    #[derive(Debug, Error)]
    pub enum MapError {
        #[error("invalid map request: {0}")]
        InvalidRequest(#[from] RequestError),
        #[error("anchor point cannot be projected: {0}")]
        Projection(#[from] CrsError),
        #[error("every road query mode failed: {attempts}")]
        RoadsUnavailable { attempts: String },
    }

    impl From<AoiError> for MapError {
        fn from(err: AoiError) -> Self {
            match err {
                AoiError::InvalidRadius(miles) => {
                    MapError::InvalidRequest(RequestError::InvalidRadius(miles))
                }
                AoiError::Projection(source) => MapError::Projection(source),
            }
        }
    }
}

pub use errors::MapError;
pub use pipeline::{MapOutput, RunSummary, VicinityMapPipeline};
pub use request::{AnchorPoint, DrawingScale, MapRequest, RequestError};
pub use scale::{CoordinateBasis, ScaleTransform};
