use std::io::{self, Write};

use serde::Serialize;

use crate::error::CliError;

/// Write `value` to stdout as one JSON document.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let encoded = encode(value, pretty)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{encoded}")?;
    stdout.flush()?;
    Ok(())
}

fn encode<T: Serialize>(value: &T, pretty: bool) -> Result<String, CliError> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pretty_output_is_indented() {
        let value = json!({"reset": 3});
        assert_eq!(encode(&value, false).expect("compact"), r#"{"reset":3}"#);
        assert_eq!(
            encode(&value, true).expect("pretty"),
            "{\n  \"reset\": 3\n}"
        );
    }
}
