//! Interface de linha de comando do AgriTrace baseada em clap.
//!
//! Define a struct [`Cli`] com um subcomando [`Command`] por operação de
//! leitura e flags globais (--config, --max-attempts, --base-delay-ms, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AgriTrace: leitura resiliente de registros de rastreabilidade e documentos.
#[derive(Debug, Parser)]
#[command(name = "agritrace", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./agritrace.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Total de tentativas por leitura de registro.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Atraso base do backoff em milissegundos.
    #[arg(long, global = true)]
    pub base_delay_ms: Option<u64>,

    /// Habilita saída detalhada (retentativas e trocas de endpoint).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Registro completo do produto de um lote.
    Product {
        batch_id: String,
    },

    /// Visão resumida do produto com a contagem de eventos.
    Summary {
        batch_id: String,
    },

    /// Participante registrado, pelo endereço.
    User {
        /// Endereço da conta, prefixado com 0x.
        address: String,
    },

    /// Indica se o endereço está registrado no contrato.
    Registered {
        address: String,
    },

    /// Indica se o endereço foi verificado.
    Verified {
        address: String,
    },

    /// Eventos da cadeia de suprimentos registrados para um lote.
    Events {
        batch_id: String,
    },

    /// Produto e eventos juntos.
    History {
        batch_id: String,
    },

    /// Todos os ids de lote conhecidos pelo contrato.
    Batches,

    /// Número de produtos registrados.
    Count,

    /// Baixa um blob pelo hash de conteúdo.
    Blob {
        hash: String,

        /// Grava os bytes neste arquivo em vez do stdout.
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Busca um blob e o imprime como JSON.
    Json {
        hash: String,
    },

    /// Busca os metadados de certificação e o documento que eles apontam.
    Cert {
        /// Hash de conteúdo do JSON de metadados.
        hash: String,

        /// Grava o documento de certificação neste arquivo.
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Imprime a URL do gateway para um hash, sem buscá-lo.
    Url {
        hash: String,
    },

    /// Mostra os endpoints atuais e o tamanho de cada pool.
    Status,

    /// Verifica se o nó RPC e o gateway atuais respondem.
    Health,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_product_subcommand() {
        let cli = Cli::parse_from(["agritrace", "product", "BATCH-TOM-20240301"]);
        match cli.command {
            Command::Product { batch_id } => assert_eq!(batch_id, "BATCH-TOM-20240301"),
            _ => panic!("expected Product command"),
        }
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "agritrace",
            "history",
            "BATCH-1",
            "--config",
            "/etc/agritrace.toml",
            "--max-attempts",
            "5",
            "--base-delay-ms",
            "250",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/agritrace.toml")));
        assert_eq!(cli.max_attempts, Some(5));
        assert_eq!(cli.base_delay_ms, Some(250));
        assert!(matches!(cli.command, Command::History { .. }));
    }

    #[test]
    fn cli_parses_blob_output() {
        let cli = Cli::parse_from(["agritrace", "blob", "QmHash", "--out", "cert.pdf"]);
        match cli.command {
            Command::Blob { hash, out } => {
                assert_eq!(hash, "QmHash");
                assert_eq!(out, Some(PathBuf::from("cert.pdf")));
            }
            _ => panic!("expected Blob command"),
        }
    }

    #[test]
    fn cli_parses_diagnostics_and_user_checks() {
        assert!(matches!(
            Cli::parse_from(["agritrace", "status"]).command,
            Command::Status
        ));
        assert!(matches!(
            Cli::parse_from(["agritrace", "health", "-v"]).command,
            Command::Health
        ));
        match Cli::parse_from(["agritrace", "verified", "0xabc"]).command {
            Command::Verified { address } => assert_eq!(address, "0xabc"),
            _ => panic!("expected Verified command"),
        }
        assert!(matches!(
            Cli::parse_from(["agritrace", "registered", "0xabc"]).command,
            Command::Registered { .. }
        ));
    }

    #[test]
    fn cli_requires_arguments() {
        assert!(Cli::try_parse_from(["agritrace", "user"]).is_err());
        assert!(Cli::try_parse_from(["agritrace"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
