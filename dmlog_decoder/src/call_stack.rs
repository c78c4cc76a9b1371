use crate::LineError;

/// The calls open in the current transaction, by [`crate::types::Call::index`].
///
/// Calls live in the transaction's `calls` arena, this only tracks nesting.
#[derive(Debug, Default)]
pub struct CallStack {
    indices: Vec<u32>,
}

/// Where a call sat in the tree when it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Popped {
    pub index: u32,
    /// 0 when the popped call was the outermost one.
    pub parent_index: u32,
    pub depth: u32,
}

impl CallStack {
    pub fn push(&mut self, index: u32) {
        self.indices.push(index)
    }

    pub fn pop(&mut self) -> Result<Popped, LineError> {
        let depth = self.indices.len().checked_sub(1).ok_or(LineError::StackUnderflow)?;
        let index = self.indices.pop().ok_or(LineError::StackUnderflow)?;
        Ok(Popped {
            index,
            parent_index: self.indices.last().copied().unwrap_or(0),
            depth: depth as u32,
        })
    }

    pub fn peek(&self) -> Option<u32> {
        self.indices.last().copied()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear()
    }
}

#[test]
fn parent_and_depth() {
    let mut stack = CallStack::default();
    stack.push(1);
    stack.push(2);
    stack.push(3);
    assert_eq!(
        stack.pop().unwrap(),
        Popped {
            index: 3,
            parent_index: 2,
            depth: 2
        }
    );
    stack.push(4);
    assert_eq!(stack.peek(), Some(4));
    assert_eq!(stack.pop().unwrap().parent_index, 2);
    assert_eq!(stack.pop().unwrap().depth, 1);
    assert_eq!(
        stack.pop().unwrap(),
        Popped {
            index: 1,
            parent_index: 0,
            depth: 0
        }
    );
    assert!(stack.is_empty());
    assert!(matches!(stack.pop(), Err(LineError::StackUnderflow)));
}
