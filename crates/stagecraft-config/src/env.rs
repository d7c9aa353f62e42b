use std::sync::OnceLock;

use regex::Regex;

/// Substitute `{{ env.VAR }}` placeholders in raw TOML text
///
/// An optional fallback is supported via `{{ env.VAR | default("value") }}`;
/// without one, an unset variable is an error. TOML comment lines are left
/// untouched so commented-out secrets don't have to resolve.
pub fn expand_env(input: &str) -> Result<String, String> {
    fn placeholder() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r#"\{\{\s*env\.([A-Za-z0-9_]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
                .expect("must be valid regex")
        })
    }

    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last_end = 0;
        for captures in placeholder().captures_iter(line) {
            let overall = captures.get(0).expect("capture 0 always present");
            let var_name = captures.get(1).expect("var name group").as_str();

            output.push_str(&line[last_end..overall.start()]);

            match std::env::var(var_name) {
                Ok(value) => output.push_str(&value),
                Err(_) => match captures.get(2) {
                    Some(default) => output.push_str(default.as_str()),
                    None => return Err(format!("environment variable not found: `{var_name}`")),
                },
            }

            last_end = overall.end();
        }
        output.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}
