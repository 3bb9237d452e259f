use rusqlite::{OptionalExtension, Row, params};

use super::{Database, KnowledgeDoc, NewKnowledgeDoc, PersonRef, new_id, now_iso8601};
use crate::error::AppError;

const SELECT_DOC: &str = "
    SELECT d.id, d.original_name, d.stored_path, d.chunk_count, d.vector_ids, d.file_size,
           d.created_at, u.id, u.name, u.email
    FROM knowledge_docs d
    JOIN users u ON u.id = d.uploaded_by";

fn doc_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeDoc> {
    let ids_json: String = row.get(4)?;
    let vector_ids: Vec<String> = serde_json::from_str(&ids_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(KnowledgeDoc {
        id: row.get(0)?,
        original_name: row.get(1)?,
        stored_path: row.get(2)?,
        chunk_count: row.get::<_, i64>(3)? as usize,
        vector_ids,
        file_size: row.get::<_, i64>(5)? as u64,
        created_at: row.get(6)?,
        uploaded_by: PersonRef { id: row.get(7)?, name: row.get(8)?, email: row.get(9)? },
    })
}

impl Database {
    /// Record an ingested document. `chunk_count` is derived from the id list.
    pub fn insert_knowledge_doc(&self, new: NewKnowledgeDoc) -> Result<KnowledgeDoc, AppError> {
        let id = new_id();
        let ids_json = serde_json::to_string(&new.vector_ids)
            .map_err(|e| AppError::Store(format!("serialize vector ids: {e}")))?;
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO knowledge_docs
                    (id, original_name, stored_path, uploaded_by, chunk_count, vector_ids, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    new.original_name,
                    new.stored_path,
                    new.uploaded_by,
                    new.vector_ids.len() as i64,
                    ids_json,
                    new.file_size as i64,
                    now_iso8601(),
                ],
            )?;
        }
        self.knowledge_doc(&id)
    }

    /// All knowledge documents, newest first.
    pub fn list_knowledge_docs(&self) -> Result<Vec<KnowledgeDoc>, AppError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{SELECT_DOC} ORDER BY d.created_at DESC, d.id DESC"))?;
        let docs = stmt.query_map([], doc_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn knowledge_doc(&self, id: &str) -> Result<KnowledgeDoc, AppError> {
        let conn = self.conn()?;
        conn.query_row(&format!("{SELECT_DOC} WHERE d.id = ?1"), params![id], doc_from_row)
            .optional()?
            .ok_or_else(|| AppError::NotFound("Document not found".into()))
    }

    pub fn delete_knowledge_doc(&self, id: &str) -> Result<(), AppError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM knowledge_docs WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(AppError::NotFound("Document not found".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewUser, Role};

    #[test]
    fn insert_list_delete() {
        let db = Database::open_in_memory().unwrap();
        let admin = db
            .create_user(NewUser {
                name: "Admin".into(),
                email: "admin@campus.edu".into(),
                password_hash: None,
                role: Role::Admin,
                google_id: None,
            })
            .unwrap();

        let doc = db
            .insert_knowledge_doc(NewKnowledgeDoc {
                original_name: "handbook.pdf".into(),
                stored_path: "/tmp/knowledge-1.pdf".into(),
                uploaded_by: admin.id.clone(),
                vector_ids: vec!["a_0".into(), "a_1".into()],
                file_size: 2048,
            })
            .unwrap();
        assert_eq!(doc.chunk_count, 2);
        assert_eq!(doc.vector_ids.len(), doc.chunk_count);
        assert_eq!(doc.uploaded_by.name, "Admin");

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["pineconeIds"][1], "a_1");
        assert!(json.get("storedPath").is_none());

        assert_eq!(db.list_knowledge_docs().unwrap().len(), 1);
        db.delete_knowledge_doc(&doc.id).unwrap();
        assert!(matches!(db.knowledge_doc(&doc.id), Err(AppError::NotFound(_))));
        assert!(matches!(db.delete_knowledge_doc(&doc.id), Err(AppError::NotFound(_))));
    }
}
