//! Configuração do cliente carregada a partir de `agritrace.toml`.
//!
//! A struct [`ClientConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam os defaults de retentativa
//! (3 tentativas, 1000ms de atraso base). As listas de endpoints não têm
//! default: um cliente sem nós RPC ou gateways é erro de configuração.
//! Timeouts de conexão e de requisição só existem quando configurados.
//! As variáveis `AGRITRACE_RPC_ENDPOINTS` e `AGRITRACE_GATEWAY_ENDPOINTS`
//! (separadas por vírgula) têm precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::TraceError;
use crate::retry::RetryConfig;

pub const DEFAULT_CONFIG_FILE: &str = "agritrace.toml";
pub const RPC_ENDPOINTS_VAR: &str = "AGRITRACE_RPC_ENDPOINTS";
pub const GATEWAY_ENDPOINTS_VAR: &str = "AGRITRACE_GATEWAY_ENDPOINTS";

/// Tudo o que é preciso para construir um cliente de leitura.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Endpoints RPC de registros, o primário primeiro.
    #[serde(default)]
    pub rpc_endpoints: Vec<String>,

    /// URLs base dos gateways de blobs, tentados em ordem.
    #[serde(default)]
    pub gateway_endpoints: Vec<String>,

    /// Total de tentativas por leitura de registro.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Timeout de conexão HTTP; ausente significa sem limite.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Timeout total por requisição HTTP; ausente significa sem limite.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

// Valor padrão para tentativas: 3.
fn default_max_attempts() -> u32 {
    RetryConfig::default().max_attempts
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    RetryConfig::default().base_delay_ms
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_endpoints: Vec::new(),
            gateway_endpoints: Vec::new(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            connect_timeout_ms: None,
            request_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    /// Carrega de `path`, ou de `agritrace.toml` no diretório atual quando
    /// nenhum caminho é dado. Arquivo padrão ausente usa os defaults; arquivo
    /// explícito ausente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<ClientConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Substitui as listas de endpoints por valores não vazios de `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(list) = lookup(RPC_ENDPOINTS_VAR).map(|v| split_list(&v))
            && !list.is_empty()
        {
            self.rpc_endpoints = list;
        }
        if let Some(list) = lookup(GATEWAY_ENDPOINTS_VAR).map(|v| split_list(&v))
            && !list.is_empty()
        {
            self.gateway_endpoints = list;
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Validações que não precisam de rede. As URLs dos endpoints são
    /// validadas quando os pools são construídos.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.max_attempts == 0 {
            return Err(TraceError::Config("max_attempts must be at least 1".into()));
        }
        if self.rpc_endpoints.is_empty() {
            return Err(TraceError::Config(format!(
                "no RPC endpoints configured (set rpc_endpoints or {RPC_ENDPOINTS_VAR})"
            )));
        }
        if self.gateway_endpoints.is_empty() {
            return Err(TraceError::Config(format!(
                "no gateway endpoints configured (set gateway_endpoints or {GATEWAY_ENDPOINTS_VAR})"
            )));
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
