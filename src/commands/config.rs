use anyhow::Result;
use dayflow_core::DayflowConfig;
use owo_colors::OwoColorize;

pub fn run() -> Result<()> {
    let config_path = DayflowConfig::config_path()?;
    let config = DayflowConfig::load()?;

    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());
    match config.vault_path() {
        Ok(vault) => println!("  Vault:   {}", vault.display()),
        Err(e) => println!("  Vault:   {}", e.to_string().red()),
    }
    println!("  Status:  {}", config.status_store()?.path().display());
    println!("  Zone:    {}", config.timezone()?.name());

    println!("\n{}", "Settings".bold());
    for line in config.to_toml()?.lines() {
        println!("  {line}");
    }

    Ok(())
}
