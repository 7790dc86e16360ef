//! Plugin source preprocessing
//!
//! Plugins are written as ES modules with named exports or an explicit
//! `export default { ... }`. Both forms are normalized into a single default
//! export whose function members are wrapped in forwarding arrows, so no
//! function object (and its `.prototype`) crosses the sandbox boundary.

use regex::Regex;
use std::sync::OnceLock;

/// Global the sandbox assigns the default export to
pub const EXPORTS_GLOBAL: &str = "__pluginExports";

fn named_decl() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*)export[ \t]+((?:async[ \t]+)?function\b[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)|(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*))")
            .unwrap_or_else(|_| unreachable!())
    })
}

fn export_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*export[ \t]*\{([^}]*)\}[ \t]*;?").unwrap_or_else(|_| unreachable!())
    })
}

fn export_default() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([ \t]*)export[ \t]+default[ \t]+").unwrap_or_else(|_| unreachable!()))
}

fn module_default() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^export default ").unwrap_or_else(|_| unreachable!()))
}

/// Normalize plugin exports into one wrapped default export.
///
/// Code without any export is returned unchanged.
pub fn preprocess(code: &str) -> String {
    if export_default().is_match(code) {
        return wrap_explicit_default(code);
    }

    let mut names: Vec<(String, String)> = Vec::new();
    for caps in named_decl().captures_iter(code) {
        if let Some(name) = caps.get(3).or_else(|| caps.get(4)) {
            names.push((name.as_str().to_string(), name.as_str().to_string()));
        }
    }
    for caps in export_list().captures_iter(code) {
        for item in caps[1].split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (local, exported) = match item.split_once(" as ") {
                Some((local, exported)) => (local.trim(), exported.trim()),
                None => (item, item),
            };
            names.push((exported.to_string(), local.to_string()));
        }
    }

    if names.is_empty() {
        return code.to_string();
    }

    let stripped = named_decl().replace_all(code, "$1$2");
    let stripped = export_list().replace_all(&stripped, "");

    let members: Vec<String> = names
        .iter()
        .map(|(exported, local)| {
            format!(
                "  {exported}: typeof {local} === 'function' ? (...args) => {local}(...args) : {local},"
            )
        })
        .collect();

    format!("{}\nexport default {{\n{}\n}};\n", stripped, members.join("\n"))
}

fn wrap_explicit_default(code: &str) -> String {
    let body = export_default().replace(code, "${1}const __pluginDefault = ");
    format!(
        "{}\nexport default Object.fromEntries(Object.entries(__pluginDefault).map(([key, value]) => [key, typeof value === 'function' ? (...args) => value(...args) : value]));\n",
        body
    )
}

/// Turn preprocessed module code into a script that assigns the default
/// export to [`EXPORTS_GLOBAL`]
pub fn to_script(module_code: &str) -> String {
    module_default()
        .replace_all(module_code, format!("globalThis.{} = ", EXPORTS_GLOBAL).as_str())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_exports() {
        let code = "export function main() { return 1; }\nexport const config = { name: 'x' };\n";
        let out = preprocess(code);
        assert!(out.starts_with("function main()"));
        assert!(out.contains("const config = { name: 'x' };"));
        assert!(out.contains("main: typeof main === 'function' ? (...args) => main(...args) : main,"));
        assert!(out.contains("config: typeof config === 'function'"));
        assert!(out.contains("export default {"));
    }

    #[test]
    fn test_async_function_and_export_list() {
        let code = "async function onClick() {}\nexport async function main() {}\nexport { onClick as click };";
        let out = preprocess(code);
        assert!(out.contains("async function main()"));
        assert!(!out.contains("export {"));
        assert!(out.contains("click: typeof onClick === 'function' ? (...args) => onClick(...args) : onClick,"));
    }

    #[test]
    fn test_explicit_default_object() {
        let code = "function main() {}\nconst config = {};\nexport default { main, config };";
        let out = preprocess(code);
        assert!(out.contains("const __pluginDefault = { main, config };"));
        assert!(out.contains("Object.entries(__pluginDefault)"));
        assert_eq!(out.matches("export default").count(), 1);
    }

    #[test]
    fn test_no_exports_unchanged() {
        let code = "function main() { return null; }";
        assert_eq!(preprocess(code), code);
    }

    #[test]
    fn test_to_script() {
        let script = to_script(&preprocess("export function main() {}"));
        assert!(script.contains("globalThis.__pluginExports = {"));
        assert!(!script.contains("export "));
    }

    #[test]
    fn test_indented_export_in_string_is_not_a_declaration() {
        let code = "export function main() { return 'export default'; }";
        let out = preprocess(code);
        assert!(out.contains("return 'export default';"));
        assert!(out.contains("main: typeof main"));
    }
}
