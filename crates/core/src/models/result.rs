use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 工具输出解析后的标准结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedResult {
    /// 子域名及其DNS记录
    Asset(DiscoveredAsset),
    /// HTTP探测响应，原样透传
    HttpResponse(HttpProbeRecord),
    /// 端口列表。单值任务的主机由任务上下文给出，此时 `host` 为空；
    /// 多值任务按主机拆分，每个主机一条
    Ports {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        ports: Vec<u16>,
    },
    Vulnerability(Vulnerability),
}

impl NormalizedResult {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedResult::Asset(_) => "asset",
            NormalizedResult::HttpResponse(_) => "http_response",
            NormalizedResult::Ports { .. } => "ports",
            NormalizedResult::Vulnerability(_) => "vulnerability",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Soa,
    Txt,
}

impl std::str::FromStr for DnsRecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(DnsRecordType::A),
            "AAAA" => Ok(DnsRecordType::Aaaa),
            "CNAME" => Ok(DnsRecordType::Cname),
            "MX" => Ok(DnsRecordType::Mx),
            "NS" => Ok(DnsRecordType::Ns),
            "SOA" => Ok(DnsRecordType::Soa),
            "TXT" => Ok(DnsRecordType::Txt),
            other => Err(format!("unsupported dns record type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredAsset {
    pub value: String,
    #[serde(default)]
    pub dns_records: BTreeMap<DnsRecordType, Vec<String>>,
}

/// httpx 的一行JSON输出；未建模的字段保留在 `extra`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpProbeRecord {
    pub url: Option<String>,
    pub input: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub scheme: Option<String>,
    pub title: Option<String>,
    pub webserver: Option<String>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub tech: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HttpProbeRecord {
    /// 对应的资产值：优先 input，其次 host
    pub fn asset_value(&self) -> Option<&str> {
        self.input
            .as_deref()
            .or(self.host.as_deref())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Vulnerability {
    pub id: Uuid,
    pub name: String,
    pub template_id: Option<String>,
    pub severity: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub references: Vec<String>,
    pub authors: Vec<String>,
    pub cve_ids: Vec<String>,
    pub cwe_ids: Vec<String>,
    pub cvss_metrics: Option<String>,
    pub cvss_score: Option<f64>,
    pub host: Option<String>,
    pub matched_at: Vec<String>,
    pub extracted_results: Vec<String>,
}

/// 资产引用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: Uuid,
    pub value: String,
}

/// 一次结果持久化带来的变化，用于生成后续领域事件
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredChanges {
    /// 新发现的资产
    pub new_assets: Vec<AssetRef>,
    /// 写入了HTTP探测结果的资产
    pub probed_assets: Vec<AssetRef>,
    /// 写入了端口的资产
    pub port_assets: Vec<AssetRef>,
    pub ports: Vec<u16>,
    pub vulnerability_ids: Vec<Uuid>,
}

impl StoredChanges {
    pub fn is_empty(&self) -> bool {
        self.new_assets.is_empty()
            && self.probed_assets.is_empty()
            && self.port_assets.is_empty()
            && self.vulnerability_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_record_keeps_unknown_fields() {
        let record: HttpProbeRecord = serde_json::from_value(json!({
            "url": "https://a.example.com",
            "input": "a.example.com",
            "status_code": 200,
            "tech": ["nginx"],
            "hash": {"body_md5": "abc"}
        }))
        .unwrap();

        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.asset_value(), Some("a.example.com"));
        assert!(record.extra.contains_key("hash"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["hash"]["body_md5"], "abc");
    }

    #[test]
    fn test_result_is_tagged() {
        let value = serde_json::to_value(NormalizedResult::Ports {
            host: None,
            ports: vec![80, 443],
        })
        .unwrap();
        assert_eq!(value["type"], "ports");
        assert_eq!(value["ports"], json!([80, 443]));
        assert!(value.get("host").is_none());

        let parsed: NormalizedResult =
            serde_json::from_value(json!({"type": "ports", "host": "a.example.com", "ports": [22]}))
                .unwrap();
        assert_eq!(
            parsed,
            NormalizedResult::Ports {
                host: Some("a.example.com".to_string()),
                ports: vec![22]
            }
        );
    }

    #[test]
    fn test_dns_record_type_parsing() {
        assert_eq!("aaaa".parse::<DnsRecordType>().unwrap(), DnsRecordType::Aaaa);
        assert!("SRV".parse::<DnsRecordType>().is_err());
        assert_eq!(serde_json::to_string(&DnsRecordType::Cname).unwrap(), "\"CNAME\"");
    }
}
