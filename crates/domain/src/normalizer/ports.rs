use std::collections::{BTreeSet, HashMap};

use recon_core::models::NormalizedResult;
use tracing::warn;

fn split_line(line: &str) -> Option<(&str, u16)> {
    line.rsplit_once(':')
        .filter(|(host, _)| !host.is_empty())
        .and_then(|(host, port)| port.trim().parse::<u16>().ok().map(|p| (host, p)))
        .filter(|(_, port)| *port != 0)
}

/// `host:port` 行 → 排序去重后的端口列表；主机由任务上下文提供，这里丢弃
pub fn parse_ports(raw: &str) -> Vec<NormalizedResult> {
    let mut ports = BTreeSet::new();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match split_line(line) {
            Some((_, port)) => {
                ports.insert(port);
            }
            None => warn!(line = line, "跳过无法解析的端口扫描输出行"),
        }
    }

    if ports.is_empty() {
        return Vec::new();
    }

    vec![NormalizedResult::Ports {
        host: None,
        ports: ports.into_iter().collect(),
    }]
}

/// 多值任务：按任务的输入值归属端口，每个有端口的主机一条结果
///
/// 主机不在 `hosts` 中的行无法归属，跳过。
pub fn parse_ports_by_host(raw: &str, hosts: &[String]) -> Vec<NormalizedResult> {
    let mut by_host: HashMap<&str, BTreeSet<u16>> = HashMap::new();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match split_line(line) {
            Some((host, port)) if hosts.iter().any(|h| h == host) => {
                by_host.entry(host).or_default().insert(port);
            }
            Some((host, _)) => warn!(host = host, "端口扫描输出的主机不属于该任务，已跳过"),
            None => warn!(line = line, "跳过无法解析的端口扫描输出行"),
        }
    }

    hosts
        .iter()
        .filter_map(|host| {
            by_host.remove(host.as_str()).map(|ports| NormalizedResult::Ports {
                host: Some(host.clone()),
                ports: ports.into_iter().collect(),
            })
        })
        .collect()
}
