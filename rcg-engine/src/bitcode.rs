//! On-disk module format
//!
//! A bitcode file is a JSON document: a header naming the format and its
//! version, followed by the serialized module.

use log::debug;
use rcg_common::{CodegenError, Result};
use rcg_ir::Module;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const MAGIC: &str = "RCGBC";

/// Current format version; files with any other version are rejected
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<'a> {
    magic: &'a str,
    version: u32,
    module: &'a Module,
}

#[derive(Deserialize)]
struct Header {
    magic: String,
    version: u32,
}

#[derive(Deserialize)]
struct Body {
    module: Module,
}

/// Serialize `module` into bitcode bytes
pub fn to_bytes(module: &Module) -> Result<Vec<u8>> {
    let envelope = Envelope {
        magic: MAGIC,
        version: FORMAT_VERSION,
        module,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse bitcode bytes, checking the header before the module
pub fn from_bytes(bytes: &[u8]) -> Result<Module> {
    let header: Header = serde_json::from_slice(bytes)?;
    if header.magic != MAGIC {
        return Err(CodegenError::bitcode(format!(
            "bad magic '{}', expected '{MAGIC}'",
            header.magic
        )));
    }
    if header.version != FORMAT_VERSION {
        return Err(CodegenError::bitcode(format!(
            "unsupported format version {} (this build reads version {FORMAT_VERSION})",
            header.version
        )));
    }
    let body: Body = serde_json::from_slice(bytes)?;
    body.module
        .check_integrity()
        .map_err(|err| CodegenError::bitcode(format!("corrupt module: {err}")))?;
    Ok(body.module)
}

pub fn write_bitcode(module: &Module, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(module)?;
    fs::write(path, &bytes)?;
    debug!("Wrote module '{}' to {} ({} bytes)", module.name(), path.display(), bytes.len());
    Ok(())
}

pub fn read_bitcode(path: impl AsRef<Path>) -> Result<Module> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let module = from_bytes(&bytes)?;
    debug!("Read module '{}' from {}", module.name(), path.display());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rcg_common::ErrorKind;

    #[test]
    fn test_header_is_checked() {
        let module = Module::new("header");
        let bytes = to_bytes(&module).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap().name(), "header");

        let text = String::from_utf8(bytes).unwrap();
        let wrong_magic = text.replace(MAGIC, "LLVMBC");
        assert_eq!(from_bytes(wrong_magic.as_bytes()).unwrap_err().kind(), ErrorKind::Bitcode);

        let wrong_version = text.replace("\"version\":1", "\"version\":99");
        assert_eq!(from_bytes(wrong_version.as_bytes()).unwrap_err().kind(), ErrorKind::Bitcode);
    }

    #[test]
    fn test_dangling_handles_are_rejected() {
        let mut module = Module::new("id");
        let i32_ty = module.types.i32();
        let id = module.declare_function("id", i32_ty, &[i32_ty], false).unwrap();
        let x = module.params(id)[0];
        let entry = module.append_block(id, "entry");
        rcg_ir::Builder::new(&mut module).build(entry, |b| b.ret(x)).unwrap();

        let text = String::from_utf8(to_bytes(&module).unwrap()).unwrap();
        let needle = format!("\"Return\":{}", x.index());
        assert!(text.contains(&needle));
        let dangling = text.replace(&needle, "\"Return\":9999");
        let err = from_bytes(dangling.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Bitcode);

        let bad_type = text.replacen("\"Int\":32", "\"Pointer\":500", 1);
        assert_eq!(from_bytes(bad_type.as_bytes()).unwrap_err().kind(), ErrorKind::Bitcode);
    }

    #[test]
    fn test_garbage_and_missing_file() {
        assert_eq!(from_bytes(b"\x42\x43\xc0\xde").unwrap_err().kind(), ErrorKind::Bitcode);
        let err = read_bitcode("/nonexistent/dir/module.bc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
