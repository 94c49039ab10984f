fn main() -> anyhow::Result<()> {
    wiiarc::cli::run_cli()
}
