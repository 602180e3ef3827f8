//! Read-only lookups: search, apis, files, functions

use anyhow::Result;

use super::print_json;
use api_lookup::store::types::{Declaration, Page};
use api_lookup::Indexer;

pub fn search(indexer: &Indexer, name: &str, offset: i64, limit: i64, json: bool) -> Result<()> {
    let page = indexer
        .query_engine()
        .search_declarations(name, offset, limit)?;
    if json {
        return print_json(&page);
    }

    if page.items.is_empty() {
        println!("No declarations match '{}'", name);
        return Ok(());
    }
    for decl in &page.items {
        println!("{}", format_declaration(decl, true));
    }
    print_footer(&page);
    Ok(())
}

pub fn apis(indexer: &Indexer, json: bool) -> Result<()> {
    let apis = indexer.query_engine().list_indexed_apis()?;
    if json {
        return print_json(&apis);
    }

    if apis.is_empty() {
        println!("No APIs indexed. Run 'api-lookup generate <dir>' or drop a .ctags file into the apis directory.");
    }
    for api in apis {
        println!("{api}");
    }
    Ok(())
}

pub fn files(indexer: &Indexer, api: &str, offset: i64, limit: i64, json: bool) -> Result<()> {
    let page = indexer.query_engine().list_api_files(api, offset, limit)?;
    if json {
        return print_json(&page);
    }

    if page.items.is_empty() {
        println!("No files indexed for '{}'", api);
        return Ok(());
    }
    for file in &page.items {
        println!("{file}");
    }
    print_footer(&page);
    Ok(())
}

pub fn functions(indexer: &Indexer, file: &str, offset: i64, limit: i64, json: bool) -> Result<()> {
    let page = indexer
        .query_engine()
        .list_functions_by_file(file, offset, limit)?;
    if json {
        return print_json(&page);
    }

    if page.items.is_empty() {
        println!("No declarations indexed for '{}'", file);
        return Ok(());
    }
    for decl in &page.items {
        println!("{}", format_declaration(decl, false));
    }
    print_footer(&page);
    Ok(())
}

fn format_declaration(decl: &Declaration, with_path: bool) -> String {
    let location = match (with_path, decl.line) {
        (true, Some(line)) => format!("{}:{}", decl.file_path, line),
        (true, None) => decl.file_path.clone(),
        (false, Some(line)) => format!("{:>6}", line),
        (false, None) => format!("{:>6}", "-"),
    };
    let text = decl.signature.as_deref().unwrap_or(&decl.name);
    format!("[{}] {}  {:<9} {}", decl.group, location, decl.kind.as_str(), text)
}

fn print_footer<T>(page: &Page<T>) {
    if page.has_more() || page.offset > 0 {
        println!(
            "\n({}-{} of {}; use --offset to page)",
            page.offset + 1,
            page.offset + page.items.len(),
            page.total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_lookup::store::types::DeclarationKind;

    #[test]
    fn test_format_declaration() {
        let decl = Declaration {
            group: "math".to_string(),
            name: "add".to_string(),
            kind: DeclarationKind::Function,
            signature: Some("int add(int a, int b)".to_string()),
            return_type: Some("int".to_string()),
            scope: None,
            file_path: "math.c".to_string(),
            line: Some(10),
            language: None,
        };
        assert_eq!(
            format_declaration(&decl, true),
            "[math] math.c:10  function  int add(int a, int b)"
        );
        assert_eq!(
            format_declaration(&decl, false),
            "[math]     10  function  int add(int a, int b)"
        );
    }
}
