use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser, Debug)]
#[command(name = "dre")]
#[command(
    version,
    about = "Builds a monthly Income Statement (DRE) sheet inside an Excel workbook"
)]
#[command(
    long_about = "Reads the Vendas, Custo_Despesas, Folha, Investimentos and Financiamento sheets of a workbook, \
rebuilds the DRE sheet with one formula column per month and writes a depreciation waterfall into Investimentos."
)]
pub struct Cli {
    /// Workbook to read (and update, unless --output is given)
    #[arg(default_value = "entrada.xlsx")]
    pub file: PathBuf,

    /// Save the result to another file instead of overwriting the input
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file (defaults to ./dre.toml, then the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// First report month as MM/YY; disables automatic period detection
    #[arg(long, requires = "end", value_name = "MM/YY")]
    pub start: Option<String>,

    /// Last report month as MM/YY
    #[arg(long, requires = "start", value_name = "MM/YY")]
    pub end: Option<String>,

    /// Income tax rate in percent, overriding the configuration
    #[arg(long, value_name = "PERCENT")]
    pub tax_rate: Option<Decimal>,

    /// Do not open the saved workbook
    #[arg(long = "no-open")]
    pub no_open: bool,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Output the run summary in JSON format
    #[arg(long = "json")]
    pub json: bool,
}

impl Cli {
    /// Where the workbook is saved
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.file.clone())
    }
}
