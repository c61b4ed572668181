use std::collections::BTreeMap;
use std::sync::LazyLock;

use recon_core::models::{DiscoveredAsset, DnsRecordType, NormalizedResult};
use regex::Regex;
use tracing::{debug, warn};

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ansi regex"));

/// `domain [TYPE] [value]`，记录类型和值都是可选的
static RECORD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_*][A-Za-z0-9_.*-]*)\.?(?:\s*[:\s]\s*\[([A-Za-z]+)\](?:\s*\[([^\]]*)\])?)?$")
        .expect("valid record regex")
});

pub fn strip_ansi(line: &str) -> String {
    ANSI_ESCAPE.replace_all(line, "").into_owned()
}

/// 解析子域名枚举输出，每个域名输出一个资产并汇总其DNS记录
pub fn parse_subdomains(raw: &str) -> Vec<NormalizedResult> {
    let mut assets: BTreeMap<String, BTreeMap<DnsRecordType, Vec<String>>> = BTreeMap::new();

    for line in raw.lines() {
        let line = strip_ansi(line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(caps) = RECORD_LINE.captures(line) else {
            warn!(line = line, "跳过无法解析的子域名输出行");
            continue;
        };

        let domain = caps[1].trim_end_matches('.').to_ascii_lowercase();
        let records = assets.entry(domain).or_default();

        let Some(record_type) = caps.get(2) else {
            continue;
        };
        let record_type = match record_type.as_str().parse::<DnsRecordType>() {
            Ok(t) => t,
            Err(e) => {
                debug!(line = line, error = %e, "忽略不支持的DNS记录类型");
                continue;
            }
        };

        let values = records.entry(record_type).or_default();
        if let Some(value) = caps.get(3).map(|v| v.as_str().trim().trim_end_matches('.')) {
            if !value.is_empty() && !values.iter().any(|v| v == value) {
                values.push(value.to_string());
            }
        }
    }

    assets
        .into_iter()
        .map(|(value, dns_records)| NormalizedResult::Asset(DiscoveredAsset { value, dns_records }))
        .collect()
}
