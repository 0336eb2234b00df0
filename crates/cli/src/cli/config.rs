use adb_domain::config::{ClientConfig, ConfigIssue, ConfigSeverity};

/// Check the client config and print what would stop `arangoq` connecting.
///
/// Returns `false` when errors were found.
pub fn validate(config: &ClientConfig, config_path: &str) -> bool {
    let (text, ok) = report(&config.validate(), config_path);
    print!("{text}");
    ok
}

/// Errors first, then warnings, then a one-line verdict.
fn report(issues: &[ConfigIssue], config_path: &str) -> (String, bool) {
    let (errors, warnings): (Vec<_>, Vec<_>) = issues
        .iter()
        .partition(|i| i.severity == ConfigSeverity::Error);

    let mut out = String::new();
    for issue in errors.iter().chain(&warnings) {
        out.push_str(&format!("  {issue}\n"));
    }
    if errors.is_empty() {
        out.push_str(&format!(
            "{config_path}: usable client config ({} warning(s))\n",
            warnings.len()
        ));
    } else {
        out.push_str(&format!(
            "{config_path}: cannot build a client, {} error(s), {} warning(s)\n",
            errors.len(),
            warnings.len()
        ));
    }
    (out, errors.is_empty())
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &ClientConfig) -> anyhow::Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

fn render(config: &ClientConfig) -> anyhow::Result<String> {
    let mut masked = config.clone();
    if masked.auth.password.is_some() {
        masked.auth.password = Some("********".into());
    }
    if masked.auth.token.is_some() {
        masked.auth.token = Some("********".into());
    }
    Ok(toml::to_string_pretty(&masked)?)
}
