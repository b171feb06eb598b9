// Method command set
//
// Line tables map source lines to bytecode indices.

use crate::commands::{command_sets, method_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_i64, read_u64};
use crate::types::{MethodId, ReferenceTypeId};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTableEntry {
    pub line_code_index: u64,
    pub line_number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTable {
    /// -1 for native methods
    pub start: i64,
    pub end: i64,
    pub lines: Vec<LineTableEntry>,
}

impl LineTable {
    /// Lowest code index of a line, if the method has code there
    pub fn first_index_of(&self, line: i32) -> Option<u64> {
        self.lines
            .iter()
            .filter(|entry| entry.line_number == line)
            .map(|entry| entry.line_code_index)
            .min()
    }
}

impl JdwpConnection {
    pub async fn line_table(
        &self,
        ref_type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> JdwpResult<LineTable> {
        let mut request = Vec::with_capacity(16);
        request.put_u64(ref_type_id);
        request.put_u64(method_id);
        let reply = self
            .command(command_sets::METHOD, method_commands::LINE_TABLE, request)
            .await?;
        let mut data = reply.as_slice();

        let start = read_i64(&mut data)?;
        let end = read_i64(&mut data)?;
        let count = read_i32(&mut data)?;
        let mut lines = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            lines.push(LineTableEntry {
                line_code_index: read_u64(&mut data)?,
                line_number: read_i32(&mut data)?,
            });
        }

        Ok(LineTable { start, end, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_index_of_line() {
        let table = LineTable {
            start: 0,
            end: 30,
            lines: vec![
                LineTableEntry {
                    line_code_index: 12,
                    line_number: 11,
                },
                LineTableEntry {
                    line_code_index: 4,
                    line_number: 11,
                },
                LineTableEntry {
                    line_code_index: 20,
                    line_number: 16,
                },
            ],
        };
        assert_eq!(table.first_index_of(11), Some(4));
        assert_eq!(table.first_index_of(14), None);
    }
}
