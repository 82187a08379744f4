//! Describe command - prints a stored procedure's parameters.

use crate::cli::args::DescribeArgs;
use crate::config::Config;
use crate::errors::AppResult;
use crate::infra::{SqlHelper, SqlParameter};

/// Execute the describe command
pub async fn execute(args: DescribeArgs, config: Config) -> AppResult<()> {
    let sql = SqlHelper::postgres();
    let parameters = sql
        .parameter_cache()
        .resolve(&config.app.default_db, &args.procedure, args.return_value)
        .await?;

    println!("{}", args.procedure);
    if parameters.is_empty() {
        println!("  (no parameters)");
    }
    for parameter in &parameters {
        println!("{}", format_parameter(parameter));
    }

    Ok(())
}

fn format_parameter(parameter: &SqlParameter) -> String {
    format!(
        "  {:<24} {:<14} {}",
        parameter.name,
        format!("{:?}", parameter.direction),
        parameter.type_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parameter() {
        let line = format_parameter(&SqlParameter::output("total", "numeric"));
        assert!(line.contains("total"));
        assert!(line.contains("Output"));
        assert!(line.ends_with("numeric"));
    }
}
