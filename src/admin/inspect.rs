#![forbid(unsafe_code)]

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Serialize;

use crate::admin::error::ensure_exists;
use crate::admin::Result;
use crate::storage::catalog::{Catalog, FieldReader};
use crate::storage::format::BlockCode;
use crate::storage::reader::BlockStream;

/// One struct layout of the embedded catalog.
#[derive(Clone, Debug, Serialize)]
pub struct StructSummary {
    /// Struct name.
    pub name: String,
    /// Record size in bytes.
    pub size: usize,
    /// Number of fields.
    pub fields: usize,
}

/// One framed block.
#[derive(Clone, Debug, Serialize)]
pub struct BlockEntry {
    /// Byte offset of the block header.
    pub offset: u64,
    /// Block code, NUL padding stripped.
    pub code: String,
    /// Payload length.
    pub len: u32,
    /// Source identity as hex.
    pub identity: String,
    /// Struct name from the embedded catalog.
    pub struct_name: Option<String>,
    /// Records in the payload.
    pub count: u32,
    /// Datablock name for ID blocks.
    pub id_name: Option<String>,
}

/// Listing of a document file.
#[derive(Clone, Debug, Serialize)]
pub struct InspectReport {
    /// Format revision from the file header.
    pub format_version: u16,
    /// Embedded catalog, in index order.
    pub catalog: Vec<StructSummary>,
    /// Blocks after the catalog, in file order.
    pub blocks: Vec<BlockEntry>,
    /// Checksum of the end block, if it was reached and matched.
    pub checksum: Option<String>,
    /// Error that stopped the listing early.
    pub error: Option<String>,
}

/// Lists header, catalog and blocks of the file at `path`.
///
/// Framing errors after a readable header end the listing and are reported
/// in [`InspectReport::error`] rather than failing the call.
pub fn inspect(path: impl AsRef<Path>) -> Result<InspectReport> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let mut stream = BlockStream::open(BufReader::new(File::open(path)?))?;
    let mut report = InspectReport {
        format_version: stream.header().format_version,
        catalog: Vec::new(),
        blocks: Vec::new(),
        checksum: None,
        error: None,
    };
    let mut catalog: Option<Catalog> = None;
    loop {
        let offset = stream.offset();
        let block = match stream.next_block() {
            Ok(Some(block)) => block,
            Ok(None) => break,
            Err(err) => {
                report.error = Some(err.to_string());
                break;
            }
        };
        if block.header.code == BlockCode::CATALOG && catalog.is_none() {
            match Catalog::decode(&block.payload) {
                Ok(decoded) => {
                    report.catalog = decoded
                        .structs()
                        .iter()
                        .map(|def| StructSummary {
                            name: def.name().to_string(),
                            size: def.size(),
                            fields: def.fields().len(),
                        })
                        .collect();
                    catalog = Some(decoded);
                }
                Err(err) => {
                    report.error = Some(err.to_string());
                    break;
                }
            }
            continue;
        }
        let def = catalog
            .as_ref()
            .and_then(|c| c.get(block.header.struct_index));
        let id_name = match (block.header.code.id_code(), def) {
            (Some(_), Some(def))
                if def.field("name").is_some() && block.payload.len() >= def.size() =>
            {
                Some(FieldReader::new(def, &block.payload[..def.size()]).chars("name"))
            }
            _ => None,
        };
        report.blocks.push(BlockEntry {
            offset,
            code: block.header.code.to_string(),
            len: block.header.len,
            identity: hex::encode(block.header.old.0.to_be_bytes()),
            struct_name: def.map(|d| d.name().to_string()),
            count: block.header.count,
            id_name,
        });
    }
    report.checksum = stream.checksum().map(|crc| format!("{crc:08x}"));
    Ok(report)
}
