//! Classify download errors into retry policy error kinds.

use super::error::DownloadError;
use super::policy::ErrorKind;

/// Classify a download error into an ErrorKind.
pub fn classify(e: &DownloadError) -> ErrorKind {
    match e {
        DownloadError::SearchTimeout(_) => ErrorKind::Timeout,
        DownloadError::PeerUnavailable(_) => ErrorKind::PeerUnavailable,
        DownloadError::TransferInterrupted(_) => ErrorKind::Interrupted,
        DownloadError::NoSuitableSource => ErrorKind::NoCandidate,
        DownloadError::ProcessingFailed(_) => ErrorKind::Processing,
        DownloadError::Cancelled => ErrorKind::Cancelled,
        DownloadError::MalformedPayload(_) | DownloadError::UnknownTrack(_) => ErrorKind::Fatal,
        DownloadError::Exhausted(_) | DownloadError::Transition(_) | DownloadError::Storage(_) => {
            ErrorKind::Permanent
        }
    }
}
