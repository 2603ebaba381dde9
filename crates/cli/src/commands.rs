//! Command implementations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Subcommand;
use serde_json::Value;
use tracing::info;

use atelier_client::{AtelierClient, DocNamesFilter, DocumentContent, SearchParams};
use atelier_core::{Content, ResponseEnvelope};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show server version, API level and namespaces.
    Info,

    /// List documents in the namespace.
    Docs {
        /// Document category (CLS, RTN, CSP, OTH or *).
        #[arg(long, default_value = "*")]
        category: String,
        /// Document type within the category.
        #[arg(long = "type", default_value = "*")]
        doc_type: String,
        /// Name filter.
        #[arg(long, default_value = "")]
        filter: String,
        /// Include generated documents.
        #[arg(long)]
        generated: bool,
    },

    /// Print a document.
    Get {
        name: String,
        /// Write the document here instead of stdout (required for binary
        /// documents).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Upload a document from a local file.
    Put {
        name: String,
        file: PathBuf,
        /// Overwrite even if the server copy changed.
        #[arg(long)]
        ignore_conflict: bool,
    },

    /// Delete a document.
    Delete { name: String },

    /// Compile documents.
    Compile {
        #[arg(required = true)]
        names: Vec<String>,
        /// Compiler flags.
        #[arg(long, default_value = "cuk")]
        flags: String,
    },

    /// Run a SQL query.
    Query {
        sql: String,
        /// Positional query parameters.
        params: Vec<String>,
    },

    /// Search document text.
    Search {
        query: String,
        /// Maximum number of results.
        #[arg(long, default_value_t = 200)]
        max: u32,
        /// Treat the query as a regular expression.
        #[arg(long)]
        regex: bool,
    },

    /// Forget the stored session.
    Logout,
}

/// Runs `command`. The server is queried first so the API version in use
/// matches the server.
pub async fn run(client: &AtelierClient, command: Command) -> anyhow::Result<()> {
    if matches!(command, Command::Info) {
        let info = client.server_info().await?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    client
        .server_info()
        .await
        .context("connecting to server")?;

    match command {
        Command::Info | Command::Logout => Ok(()),
        Command::Docs {
            category,
            doc_type,
            filter,
            generated,
        } => {
            let envelope = client
                .doc_names(&DocNamesFilter {
                    category,
                    doc_type,
                    filter,
                    generated,
                })
                .await?;
            for item in content_items(&envelope) {
                println!("{}", item.get("name").and_then(Value::as_str).unwrap_or_default());
            }
            Ok(())
        }
        Command::Get { name, output } => {
            let envelope = client.get_doc(&name, None).await?;
            write_document(&envelope, output.as_deref())
        }
        Command::Put {
            name,
            file,
            ignore_conflict,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let document = DocumentContent::text(text.lines());
            client.put_doc(&name, &document, ignore_conflict).await?;
            info!(document = %name, "Document saved");
            Ok(())
        }
        Command::Delete { name } => {
            client.delete_doc(&name).await?;
            info!(document = %name, "Document deleted");
            Ok(())
        }
        Command::Compile { names, flags } => {
            client.action_compile(&names, Some(&flags), false).await?;
            Ok(())
        }
        Command::Query { sql, params } => {
            let params: Vec<Value> = params.into_iter().map(Value::String).collect();
            let envelope = client.action_query(&sql, &params).await?;
            for row in content_items(&envelope) {
                println!("{row}");
            }
            Ok(())
        }
        Command::Search { query, max, regex } => {
            let envelope = client
                .action_search(&SearchParams {
                    query,
                    regex,
                    max,
                    ..SearchParams::default()
                })
                .await?;
            for item in content_items(&envelope) {
                println!("{item}");
            }
            Ok(())
        }
    }
}

fn content_items(envelope: &ResponseEnvelope) -> &[Value] {
    envelope
        .result
        .content
        .as_json()
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn write_document(envelope: &ResponseEnvelope, output: Option<&Path>) -> anyhow::Result<()> {
    match (&envelope.result.content, output) {
        (Content::Binary(bytes), Some(path)) => std::fs::write(path, bytes)
            .with_context(|| format!("writing {}", path.display())),
        (Content::Binary(_), None) => bail!("binary document; use --output to save it"),
        (Content::Json(_), output) => {
            let lines: Vec<&str> = content_items(envelope)
                .iter()
                .filter_map(Value::as_str)
                .collect();
            let text = lines.join("\n");
            match output {
                Some(path) => std::fs::write(path, text + "\n")
                    .with_context(|| format!("writing {}", path.display())),
                None => {
                    println!("{text}");
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_documents_are_written_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.cls");

        let envelope = ResponseEnvelope::with_content(json!(["Class A", "{", "}"]));
        write_document(&envelope, Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Class A\n{\n}\n");
    }

    #[test]
    fn binary_documents_need_an_output_path() {
        let mut envelope = ResponseEnvelope::default();
        envelope.result.content = Content::Binary(vec![1, 2, 3]);
        assert!(write_document(&envelope, None).is_err());
    }
}
