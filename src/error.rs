use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BvError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 头文件、标记文件、二进制数据或容器文件格式错误
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 输入本身格式正确，但语义上无效（例如事件位置越界）
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Channel index {0} out of range")]
    InvalidChannelIndex(usize),
}

impl BvError {
    /// Returns `true` for errors caused by malformed or unsupported input files.
    pub fn is_format_error(&self) -> bool {
        matches!(self, BvError::InvalidFormat(_) | BvError::UnsupportedFormat(_))
    }

    /// Returns `true` for errors caused by invalid arguments to an operation.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, BvError::Validation(_) | BvError::InvalidChannelIndex(_))
    }
}

pub type Result<T> = std::result::Result<T, BvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(BvError::InvalidFormat("x".into()).is_format_error());
        assert!(BvError::UnsupportedFormat("x".into()).is_format_error());
        assert!(BvError::Validation("x".into()).is_validation_error());
        assert!(BvError::InvalidChannelIndex(3).is_validation_error());

        let io_err: BvError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(!io_err.is_format_error());
        assert!(!io_err.is_validation_error());
    }
}
