mod extractor;
mod types;
mod ytdlp;

pub use extractor::Extractor;
pub use types::DownloadResult;
pub use ytdlp::YtDlpExtractor;
