//! Interface de terminal do AgriTrace: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. Tudo aqui escreve em stderr, deixando o stdout
//! livre para JSON e bytes de blobs.

use console::{Style, Term};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::TraceError;

/// Indicador visual de progresso para uma operação de leitura.
///
/// Exibe um spinner animado enquanto a requisição roda e, ao final, um
/// checkmark verde ou um X vermelho.
pub struct FetchProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    // Estilo verde para sucesso.
    green: Style,
    // Estilo vermelho para falha.
    red: Style,
}

impl FetchProgress {
    /// Inicia o spinner com a descrição da operação.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        if Term::stderr().is_term() {
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
        }

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    pub fn success(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("  {} {message}", self.green.apply_to("✓"));
    }

    /// Finaliza o spinner e exibe a falha em vermelho.
    pub fn failure(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("  {} {message}", self.red.apply_to("✗"));
    }
}

/// Imprime um erro fatal, com a dica quando ele veio do cliente.
pub fn report_error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", Style::new().red().bold().apply_to("error:"));
    if let Some(trace) = err.downcast_ref::<TraceError>() {
        eprintln!("  {}", Style::new().dim().apply_to(trace.hint()));
    }
}

/// Imprime um valor serializável como JSON formatado no stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
