//! The task/result channel pair between a supervisor and its executor.
//!
//! Messages are line-delimited JSON over the executor child's stdin and
//! stdout. Shutdown is an explicit tagged `stop` message rather than a
//! sentinel value, so no real task can ever be mistaken for it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::io::{BufRead, Write};

/// Parent-to-executor messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskMsg {
    /// Run the transform on one record. `seq` ties the eventual result
    /// back to this dispatch.
    Work { seq: u64, record: Value },
    /// Finish the current loop and exit cleanly.
    Stop,
}

/// Executor-to-parent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ResultMsg {
    /// The result for dispatch `seq`; `out` is the envelope's result value
    /// (`None` encodes a skipped record).
    Done { seq: u64, out: Option<Value> },
}

/// Write one message as a single line and flush, so the peer sees it
/// immediately.
pub fn write_msg<M: Serialize, W: Write>(writer: &mut W, msg: &M) -> Result<()> {
    serde_json::to_writer(&mut *writer, msg).context("serialize message")?;
    writer.write_all(b"\n").context("write message delimiter")?;
    writer.flush().context("flush message")?;
    Ok(())
}

/// Read one message; `Ok(None)` means the peer closed the stream.
pub fn read_msg<M: DeserializeOwned, R: BufRead>(reader: &mut R) -> Result<Option<M>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).context("read message")?;
    if n == 0 {
        return Ok(None);
    }
    let msg = serde_json::from_str(line.trim_end())
        .with_context(|| format!("parse message: {}", line.trim_end()))?;
    Ok(Some(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_are_tagged_lines() -> Result<()> {
        let mut buf = Vec::new();
        write_msg(
            &mut buf,
            &TaskMsg::Work {
                seq: 3,
                record: json!({"id": 3}),
            },
        )?;
        write_msg(&mut buf, &TaskMsg::Stop)?;

        let text = String::from_utf8(buf.clone())?;
        assert_eq!(
            text,
            "{\"op\":\"work\",\"seq\":3,\"record\":{\"id\":3}}\n{\"op\":\"stop\"}\n"
        );

        let mut rdr = std::io::Cursor::new(buf);
        assert!(matches!(
            read_msg::<TaskMsg, _>(&mut rdr)?,
            Some(TaskMsg::Work { seq: 3, .. })
        ));
        assert!(matches!(read_msg::<TaskMsg, _>(&mut rdr)?, Some(TaskMsg::Stop)));
        assert!(read_msg::<TaskMsg, _>(&mut rdr)?.is_none());
        Ok(())
    }
}
