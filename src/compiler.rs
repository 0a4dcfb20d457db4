//! Script compiler: element sequences to canonical script bytes and back
//!
//! Data pushes use the minimal encoding the standardness rules require, so a
//! redeemer recompiling the same elements from stored parameters gets the
//! exact bytes the funding address committed to.

use crate::constants::MAX_SCRIPT_ELEMENT_SIZE;
use crate::error::{HashLockError, Result};
use crate::opcodes::*;
use crate::types::{ByteString, CompiledScript, ScriptElement};

/// Compile an ordered element sequence into a script.
///
/// Fails with `InvalidPushLength` if any data element is larger than
/// `MAX_SCRIPT_ELEMENT_SIZE`; nothing is emitted in that case.
pub fn compile(elements: &[ScriptElement]) -> Result<CompiledScript> {
    let mut script = Vec::with_capacity(estimate_len(elements));

    for element in elements {
        match element {
            ScriptElement::Op(op) => script.push(*op),
            ScriptElement::Data(data) => push_data(&mut script, data)?,
        }
    }

    Ok(CompiledScript::from_bytes(script))
}

/// Append a minimally-encoded push of `data` to `script`
pub fn push_data(script: &mut ByteString, data: &[u8]) -> Result<()> {
    if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(HashLockError::InvalidPushLength {
            len: data.len(),
            max: MAX_SCRIPT_ELEMENT_SIZE,
        });
    }

    if let Some(op) = minimal_opcode(data) {
        script.push(op);
        return Ok(());
    }

    script.extend_from_slice(&push_data_prefix(data.len()));
    script.extend_from_slice(data);
    Ok(())
}

/// Opcode that pushes `data` on its own, when one exists
fn minimal_opcode(data: &[u8]) -> Option<u8> {
    match data {
        [] => Some(OP_0),
        [n @ 1..=16] => small_int_opcode(*n),
        [0x81] => Some(OP_1NEGATE),
        _ => None,
    }
}

/// Length prefix for a push of `data_len` bytes
pub fn push_data_prefix(data_len: usize) -> Vec<u8> {
    if data_len <= OP_PUSHBYTES_75 as usize {
        vec![data_len as u8]
    } else if data_len <= 0xff {
        vec![OP_PUSHDATA1, data_len as u8]
    } else if data_len <= 0xffff {
        let mut buf = vec![OP_PUSHDATA2];
        buf.extend_from_slice(&(data_len as u16).to_le_bytes());
        buf
    } else {
        let mut buf = vec![OP_PUSHDATA4];
        buf.extend_from_slice(&(data_len as u32).to_le_bytes());
        buf
    }
}

fn estimate_len(elements: &[ScriptElement]) -> usize {
    elements
        .iter()
        .map(|e| match e {
            ScriptElement::Op(_) => 1,
            ScriptElement::Data(d) => d.len() + 3,
        })
        .sum()
}

/// Decode script bytes into elements.
///
/// Pushes that have a dedicated opcode come back as that opcode, so
/// `compile(decompile(s)) == s` for any minimally-encoded script.
pub fn decompile(script: &[u8]) -> Result<Vec<ScriptElement>> {
    let mut elements = Vec::new();
    let mut pos = 0;

    while pos < script.len() {
        let op = script[pos];
        pos += 1;

        let len = match op {
            0x01..=OP_PUSHBYTES_75 => op as usize,
            OP_PUSHDATA1 => read_len(script, &mut pos, 1)?,
            OP_PUSHDATA2 => read_len(script, &mut pos, 2)?,
            OP_PUSHDATA4 => read_len(script, &mut pos, 4)?,
            _ => {
                elements.push(ScriptElement::Op(op));
                continue;
            }
        };

        let end = pos.checked_add(len).filter(|end| *end <= script.len()).ok_or_else(|| {
            HashLockError::MalformedScript(format!(
                "push of {} bytes at offset {} runs past end of script",
                len,
                pos - 1
            ))
        })?;
        let data = &script[pos..end];
        pos = end;

        match minimal_opcode(data) {
            Some(op) => elements.push(ScriptElement::Op(op)),
            None => elements.push(ScriptElement::Data(data.to_vec())),
        }
    }

    Ok(elements)
}

fn read_len(script: &[u8], pos: &mut usize, width: usize) -> Result<usize> {
    if script.len() < *pos + width {
        return Err(HashLockError::MalformedScript(
            "truncated push length".to_string(),
        ));
    }
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(&script[*pos..*pos + width]);
    *pos += width;
    Ok(u32::from_le_bytes(buf) as usize)
}

/// True when every element is a push (OP_16 and below)
pub fn is_push_only(script: &[u8]) -> Result<bool> {
    Ok(decompile(script)?.iter().all(|e| match e {
        ScriptElement::Op(op) => *op <= OP_16,
        ScriptElement::Data(_) => true,
    }))
}

/// Render a script as space-separated ASM
pub fn to_asm(script: &[u8]) -> Result<String> {
    let parts: Vec<String> = decompile(script)?
        .iter()
        .map(|e| match e {
            ScriptElement::Op(op) => opcode_name(*op).to_string(),
            ScriptElement::Data(d) => hex::encode(d),
        })
        .collect();
    Ok(parts.join(" "))
}
