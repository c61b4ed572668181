//! 工具输出标准化
//!
//! 每个内置工具对应一个纯函数解析器 `&str -> Vec<NormalizedResult>`，通过显式构造的
//! 分发表按工具名查找。单行格式错误只会被跳过并记录日志；没有任何有效记录时返回空列表。

mod http_probe;
mod ports;
mod subdomains;
mod vulnerabilities;

use std::collections::HashMap;

use recon_core::models::{NormalizedResult, ToolDefinition};
use recon_core::ReconError;
use thiserror::Error;

pub use http_probe::parse_http_probe;
pub use ports::{parse_ports, parse_ports_by_host};
pub use subdomains::{parse_subdomains, strip_ansi};
pub use vulnerabilities::parse_vulnerabilities;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("没有与工具 {0} 关联的解析器")]
    UnknownTool(String),
    #[error("未知的解析器类型: {0}")]
    UnknownParser(String),
}

impl From<ParseError> for ReconError {
    fn from(err: ParseError) -> Self {
        ReconError::Parse(err.to_string())
    }
}

/// 解析器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    Subdomains,
    HttpProbe,
    Ports,
    Vulnerabilities,
}

impl ParserKind {
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        match name {
            "subdomains" => Ok(ParserKind::Subdomains),
            "http_probe" => Ok(ParserKind::HttpProbe),
            "ports_scanner" | "ports" => Ok(ParserKind::Ports),
            "vulnerabilities" => Ok(ParserKind::Vulnerabilities),
            other => Err(ParseError::UnknownParser(other.to_string())),
        }
    }

    pub fn parse(&self, raw: &str) -> Vec<NormalizedResult> {
        match self {
            ParserKind::Subdomains => parse_subdomains(raw),
            ParserKind::HttpProbe => parse_http_probe(raw),
            ParserKind::Ports => parse_ports(raw),
            ParserKind::Vulnerabilities => parse_vulnerabilities(raw),
        }
    }

    /// 多值的端口扫描任务按主机拆分，其余同 [`ParserKind::parse`]
    pub fn parse_for_values(&self, raw: &str, values: &[String]) -> Vec<NormalizedResult> {
        match self {
            ParserKind::Ports if values.len() > 1 => parse_ports_by_host(raw, values),
            kind => kind.parse(raw),
        }
    }
}

/// 工具名 → 解析器 的分发表
#[derive(Debug, Clone)]
pub struct Normalizer {
    parsers: HashMap<String, ParserKind>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// 内置工具的分发表
    pub fn new() -> Self {
        let parsers = [
            ("subfinder", ParserKind::Subdomains),
            ("httpx", ParserKind::HttpProbe),
            ("naabu", ParserKind::Ports),
            ("nuclei", ParserKind::Vulnerabilities),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

        Self { parsers }
    }

    /// 用工具目录补充分发表（工具声明的 parser 字段）
    pub fn with_tools(mut self, tools: &[ToolDefinition]) -> Result<Self, ParseError> {
        for tool in tools {
            let kind = ParserKind::from_name(&tool.parser)?;
            self.parsers.insert(tool.name.clone(), kind);
        }
        Ok(self)
    }

    pub fn parser_for(&self, tool_name: &str) -> Result<ParserKind, ParseError> {
        self.parsers
            .get(tool_name)
            .copied()
            .ok_or_else(|| ParseError::UnknownTool(tool_name.to_string()))
    }

    pub fn parse(&self, tool_name: &str, raw: &str) -> Result<Vec<NormalizedResult>, ParseError> {
        Ok(self.parser_for(tool_name)?.parse(raw))
    }

    /// 按任务的输入值解析，见 [`ParserKind::parse_for_values`]
    pub fn parse_for_values(
        &self,
        tool_name: &str,
        raw: &str,
        values: &[String],
    ) -> Result<Vec<NormalizedResult>, ParseError> {
        Ok(self.parser_for(tool_name)?.parse_for_values(raw, values))
    }
}
