use std::collections::HashMap;

use recon_core::models::{NormalizedResult, Vulnerability};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

/// nuclei 里既可能是字符串（逗号分隔）也可能是数组的字段
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum StringList {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl StringList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringList::Empty => Vec::new(),
            StringList::One(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            StringList::Many(v) => v,
        }
    }
}

fn list(value: Option<StringList>) -> Vec<String> {
    value.map(StringList::into_vec).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct Finding {
    #[serde(rename = "template-id")]
    template_id: Option<String>,
    info: FindingInfo,
    host: Option<String>,
    #[serde(rename = "matched-at")]
    matched_at: Option<String>,
    #[serde(rename = "extracted-results")]
    extracted_results: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct FindingInfo {
    name: String,
    author: Option<StringList>,
    tags: Option<StringList>,
    severity: Option<String>,
    description: Option<String>,
    reference: Option<StringList>,
    classification: Option<Classification>,
}

#[derive(Debug, Deserialize)]
struct Classification {
    #[serde(rename = "cve-id")]
    cve_id: Option<StringList>,
    #[serde(rename = "cwe-id")]
    cwe_id: Option<StringList>,
    #[serde(rename = "cvss-metrics")]
    cvss_metrics: Option<String>,
    #[serde(rename = "cvss-score")]
    cvss_score: Option<f64>,
}

impl From<Finding> for Vulnerability {
    fn from(finding: Finding) -> Self {
        let info = finding.info;
        let classification = info.classification;

        let mut vulnerability = Vulnerability {
            id: Uuid::new_v4(),
            name: info.name,
            template_id: finding.template_id,
            severity: info
                .severity
                .unwrap_or_else(|| "unknown".to_string())
                .to_lowercase(),
            description: info.description,
            host: finding.host,
            ..Default::default()
        };

        union_into(&mut vulnerability.tags, list(info.tags));
        union_into(&mut vulnerability.references, list(info.reference));
        union_into(&mut vulnerability.authors, list(info.author));
        union_into(
            &mut vulnerability.matched_at,
            finding.matched_at.into_iter().collect(),
        );
        union_into(
            &mut vulnerability.extracted_results,
            finding.extracted_results.unwrap_or_default(),
        );

        if let Some(c) = classification {
            union_into(&mut vulnerability.cve_ids, list(c.cve_id));
            union_into(&mut vulnerability.cwe_ids, list(c.cwe_id));
            vulnerability.cvss_metrics = c.cvss_metrics;
            vulnerability.cvss_score = c.cvss_score;
        }

        vulnerability
    }
}

fn union_into(target: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !target.contains(&value) {
            target.push(value);
        }
    }
}

/// 同名发现合并为一条记录，各数组字段取并集
fn merge(existing: &mut Vulnerability, other: Vulnerability) {
    union_into(&mut existing.tags, other.tags);
    union_into(&mut existing.references, other.references);
    union_into(&mut existing.authors, other.authors);
    union_into(&mut existing.matched_at, other.matched_at);
    union_into(&mut existing.extracted_results, other.extracted_results);
    union_into(&mut existing.cve_ids, other.cve_ids);
    union_into(&mut existing.cwe_ids, other.cwe_ids);

    if existing.description.is_none() {
        existing.description = other.description;
    }
    if existing.cvss_metrics.is_none() {
        existing.cvss_metrics = other.cvss_metrics;
    }
    if existing.cvss_score.is_none() {
        existing.cvss_score = other.cvss_score;
    }
}

pub fn parse_vulnerabilities(raw: &str) -> Vec<NormalizedResult> {
    let mut merged: Vec<Vulnerability> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let finding = match serde_json::from_str::<Finding>(line) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "跳过无法解析的漏洞扫描输出行");
                continue;
            }
        };

        let vulnerability = Vulnerability::from(finding);
        match by_name.get(&vulnerability.name) {
            Some(&index) => merge(&mut merged[index], vulnerability),
            None => {
                by_name.insert(vulnerability.name.clone(), merged.len());
                merged.push(vulnerability);
            }
        }
    }

    merged.into_iter().map(NormalizedResult::Vulnerability).collect()
}
