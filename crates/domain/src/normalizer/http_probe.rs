use recon_core::models::{HttpProbeRecord, NormalizedResult};
use tracing::warn;

/// 每行一个JSON对象，逐行独立解析，不做聚合
pub fn parse_http_probe(raw: &str) -> Vec<NormalizedResult> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<HttpProbeRecord>(line) {
            Ok(record) => Some(NormalizedResult::HttpResponse(record)),
            Err(e) => {
                warn!(error = %e, "跳过无法解析的HTTP探测输出行");
                None
            }
        })
        .collect()
}
