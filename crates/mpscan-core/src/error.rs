//! 统一错误类型定义.
//!
//! 扫描流程中只有字节源故障会中止扫描, 其余格式异常都被吸收进扫描结果.

use thiserror::Error;

/// mpscan 统一错误类型
#[derive(Debug, Error)]
pub enum ScanError {
    /// 字节源 I/O 错误 (致命, 中止扫描)
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 字节源已被关闭 (生产者或消费者提前退出)
    #[error("字节源已关闭")]
    Cancelled,
}

impl ScanError {
    /// 是否为字节源故障
    pub fn is_source_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Cancelled)
    }
}

/// mpscan 统一 Result 类型
pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_错误转换() {
        let err: ScanError = std::io::Error::other("磁盘故障").into();
        assert!(err.is_source_error());
        assert!(err.to_string().contains("磁盘故障"));
    }

    #[test]
    fn test_参数错误不是源错误() {
        assert!(!ScanError::InvalidArgument("空标记".into()).is_source_error());
        assert!(ScanError::Cancelled.is_source_error());
    }
}
