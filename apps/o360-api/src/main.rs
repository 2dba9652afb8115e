use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = o360_api::Args::parse();
	o360_api::run(args).await
}
