use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Comment, CommentInput};

/// Per-document comment logs in insertion order.
#[derive(Debug, Default)]
pub struct CommentStore {
    logs: HashMap<String, Vec<Comment>>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a comment to its document's log. The id and timestamp are
    /// always assigned here.
    pub fn add_comment(&mut self, input: CommentInput) -> Comment {
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            document_id: input.document_id,
            author_id: input.author_id,
            author_name: input.author_name,
            body: input.body,
            created_at: Utc::now(),
            selection: input.selection,
        };
        self.logs
            .entry(comment.document_id.clone())
            .or_default()
            .push(comment.clone());
        comment
    }

    /// Remove the comment with `comment_id` from whichever log holds it and
    /// return that log. `None` if no log contains the id.
    pub fn delete_comment(&mut self, comment_id: &str) -> Option<Vec<Comment>> {
        for log in self.logs.values_mut() {
            let before = log.len();
            log.retain(|c| c.id != comment_id);
            if log.len() != before {
                return Some(log.clone());
            }
        }
        None
    }

    pub fn comments_for(&self, document_id: &str) -> &[Comment] {
        self.logs.get(document_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn document_count(&self) -> usize {
        self.logs.len()
    }

    pub fn comment_count(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }
}
