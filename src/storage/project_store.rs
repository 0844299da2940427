//! Project Store
//!
//! Reads go through `ProjectStore`; every write is a free function over a
//! `&Connection` so the orchestrator can group a stage's output, its chapter
//! step marker and the token counters into one `Database::transaction`.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::Database;
use crate::novel::types::{
    AuditReport, Chapter, ChapterOutline, ChapterPlan, ChapterStatus, ChapterStep,
    ControlRequest, OutlineResult, OutlineWarning, PacingReport, Project, ProjectStatus,
    SceneRecord, ThreeActStructure,
};
use crate::novel::world_bible::{PlotThread, ThreadStatus, WorldBible};
use crate::types::{
    NovelError, ParseWithDefault, ProjectId, Result, TokenUsage, log_filter_warn,
};

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn from_json<T: serde::de::DeserializeOwned + Default>(raw: Option<String>, what: &str) -> T {
    match raw {
        Some(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!("Corrupt {} JSON, using default: {}", what, e);
            T::default()
        }),
        None => T::default(),
    }
}

const PROJECT_COLUMNS: &str = "id, title, premise, genre, tone, chapter_count, has_prologue, \
     has_epilogue, has_author_note, style_notes, status, error_reason, control_request, \
     pacing_directive, pacing_reviews_done, outline_warnings_json, input_tokens, output_tokens, \
     thinking_tokens, created_at, updated_at";

fn map_project_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let status: String = row.get(10)?;
    let control: Option<String> = row.get(12)?;
    let warnings: String = row.get(15)?;
    let created: String = row.get(19)?;
    let updated: String = row.get(20)?;
    Ok(Project {
        id: ProjectId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        premise: row.get(2)?,
        genre: row.get(3)?,
        tone: row.get(4)?,
        chapter_count: row.get(5)?,
        has_prologue: row.get(6)?,
        has_epilogue: row.get(7)?,
        has_author_note: row.get(8)?,
        style_notes: row.get(9)?,
        status: ProjectStatus::parse_or_default(&status),
        error_reason: row.get(11)?,
        control_request: control.as_deref().and_then(ControlRequest::parse),
        pacing_directive: row.get(13)?,
        pacing_reviews_done: row.get(14)?,
        outline_warnings: from_json::<Vec<OutlineWarning>>(Some(warnings), "outline warnings"),
        usage: TokenUsage::new(
            row.get::<_, i64>(16)?.max(0) as u64,
            row.get::<_, i64>(17)?.max(0) as u64,
            row.get::<_, i64>(18)?.max(0) as u64,
        ),
        created_at: parse_time(&created),
        updated_at: parse_time(&updated),
    })
}

const CHAPTER_COLUMNS: &str = "project_id, number, outline_json, step, status, plan_json, content, \
     audit_json, summary, logic_score, style_score, approved, rewrites, notes_json, word_count";

fn map_chapter_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    let outline_json: String = row.get(2)?;
    let outline: ChapterOutline = serde_json::from_str(&outline_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let step: String = row.get(3)?;
    let status: String = row.get(4)?;
    let plan: Option<String> = row.get(5)?;
    let audit: Option<String> = row.get(7)?;
    let notes: String = row.get(13)?;
    Ok(Chapter {
        project_id: ProjectId::new(row.get::<_, String>(0)?),
        number: row.get(1)?,
        outline,
        step: ChapterStep::parse_or_default(&step),
        status: ChapterStatus::parse_or_default(&status),
        plan: plan.and_then(|p| log_filter_warn(serde_json::from_str(&p), "chapter plan")),
        content: row.get(6)?,
        audit: audit.and_then(|a| log_filter_warn(serde_json::from_str(&a), "audit report")),
        summary: row.get(8)?,
        logic_score: row.get(9)?,
        style_score: row.get(10)?,
        approved: row.get(11)?,
        rewrites: row.get(12)?,
        notes: from_json(Some(notes), "chapter notes"),
        word_count: row.get::<_, i64>(14)?.max(0) as usize,
    })
}

// =============================================================================
// Reads
// =============================================================================

pub struct ProjectStore<'a> {
    db: &'a Database,
}

impl<'a> ProjectStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn load_project(&self, id: &ProjectId) -> Result<Project> {
        let conn = self.db.connection()?;
        load_project(&conn, id)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects ORDER BY created_at DESC",
            PROJECT_COLUMNS
        ))?;
        let projects = stmt
            .query_map([], map_project_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    /// Resolve a full id or a unique id prefix
    pub fn find_project(&self, id_or_prefix: &str) -> Result<Project> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM projects WHERE id = ?1 OR id LIKE ?1 || '%' LIMIT 2",
            PROJECT_COLUMNS
        ))?;
        let mut matches = stmt
            .query_map([id_or_prefix], map_project_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        match matches.len() {
            0 => Err(NovelError::NotFound(format!("project '{}'", id_or_prefix))),
            1 => Ok(matches.remove(0)),
            _ => matches
                .into_iter()
                .find(|p| p.id.as_str() == id_or_prefix)
                .ok_or_else(|| {
                    NovelError::NotFound(format!("project prefix '{}' is ambiguous", id_or_prefix))
                }),
        }
    }

    pub fn load_chapters(&self, id: &ProjectId) -> Result<Vec<Chapter>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chapters WHERE project_id = ?1 ORDER BY number",
            CHAPTER_COLUMNS
        ))?;
        let chapters = stmt
            .query_map([id.as_str()], map_chapter_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chapters)
    }

    pub fn load_chapter(&self, id: &ProjectId, number: u32) -> Result<Chapter> {
        let conn = self.db.connection()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM chapters WHERE project_id = ?1 AND number = ?2",
                CHAPTER_COLUMNS
            ),
            params![id.as_str(), number],
            map_chapter_row,
        )
        .optional()?
        .ok_or_else(|| NovelError::NotFound(format!("chapter {} of project {}", number, id)))
    }

    pub fn load_scenes(&self, id: &ProjectId, chapter: u32) -> Result<Vec<SceneRecord>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(
            "SELECT chapter, number, text, word_count, suspected_truncation
             FROM scenes WHERE project_id = ?1 AND chapter = ?2 ORDER BY number",
        )?;
        let scenes = stmt
            .query_map(params![id.as_str(), chapter], |row| {
                Ok(SceneRecord {
                    chapter: row.get(0)?,
                    number: row.get(1)?,
                    text: row.get(2)?,
                    word_count: row.get::<_, i64>(3)?.max(0) as usize,
                    suspected_truncation: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scenes)
    }

    /// World bible with the authoritative thread list overlaid
    pub fn load_world_bible(
        &self,
        id: &ProjectId,
    ) -> Result<Option<(WorldBible, ThreeActStructure)>> {
        let conn = self.db.connection()?;
        load_world_bible(&conn, id)
    }

    pub fn load_pacing_reports(&self, id: &ProjectId) -> Result<Vec<(u32, PacingReport)>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(
            "SELECT after_chapter, report_json FROM pacing_reports
             WHERE project_id = ?1 ORDER BY after_chapter",
        )?;
        let rows = stmt
            .query_map([id.as_str()], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(n, json)| {
                log_filter_warn(serde_json::from_str(&json), "pacing report")
                    .map(|r| (n, r))
            })
            .collect())
    }

    pub fn control_request(&self, id: &ProjectId) -> Result<Option<ControlRequest>> {
        let conn = self.db.connection()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT control_request FROM projects WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(raw.as_deref().and_then(ControlRequest::parse))
    }

    pub fn set_control_request(
        &self,
        id: &ProjectId,
        request: Option<ControlRequest>,
    ) -> Result<()> {
        let conn = self.db.connection()?;
        set_control_request(&conn, id, request)
    }
}

// =============================================================================
// Transactional Writes
// =============================================================================

pub fn load_project(conn: &Connection, id: &ProjectId) -> Result<Project> {
    conn.query_row(
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
        [id.as_str()],
        map_project_row,
    )
    .optional()?
    .ok_or_else(|| NovelError::NotFound(format!("project {}", id)))
}

pub fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, title, premise, genre, tone, chapter_count, has_prologue,
             has_epilogue, has_author_note, style_notes, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            project.id.as_str(),
            project.title,
            project.premise,
            project.genre,
            project.tone,
            project.chapter_count,
            project.has_prologue,
            project.has_epilogue,
            project.has_author_note,
            project.style_notes,
            project.status.as_str(),
            project.created_at.to_rfc3339(),
            project.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn set_control_request(
    conn: &Connection,
    id: &ProjectId,
    request: Option<ControlRequest>,
) -> Result<()> {
    conn.execute(
        "UPDATE projects SET control_request = ?1, updated_at = ?2 WHERE id = ?3",
        params![request.map(|r| r.as_str()), now(), id.as_str()],
    )?;
    Ok(())
}

/// Compare-and-set the project status; returns the project as it was before
pub fn transition_status(
    conn: &Connection,
    id: &ProjectId,
    allowed: impl Fn(ProjectStatus) -> bool,
    to: ProjectStatus,
    action: &str,
) -> Result<Project> {
    let project = load_project(conn, id)?;
    if !allowed(project.status) {
        return Err(NovelError::invalid_transition(project.status, action));
    }
    conn.execute(
        "UPDATE projects SET status = ?1, error_reason = NULL, control_request = NULL,
             updated_at = ?2 WHERE id = ?3",
        params![to.as_str(), now(), id.as_str()],
    )?;
    Ok(project)
}

pub fn set_status(
    conn: &Connection,
    id: &ProjectId,
    status: ProjectStatus,
    reason: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE projects SET status = ?1, error_reason = ?2, control_request = NULL,
             updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), reason, now(), id.as_str()],
    )?;
    Ok(())
}

pub fn add_usage(conn: &Connection, id: &ProjectId, usage: &TokenUsage) -> Result<()> {
    if usage.total() == 0 {
        return Ok(());
    }
    conn.execute(
        "UPDATE projects SET input_tokens = input_tokens + ?1,
             output_tokens = output_tokens + ?2, thinking_tokens = thinking_tokens + ?3,
             updated_at = ?4 WHERE id = ?5",
        params![
            usage.input as i64,
            usage.output as i64,
            usage.thinking as i64,
            now(),
            id.as_str()
        ],
    )?;
    Ok(())
}

pub fn load_world_bible(
    conn: &Connection,
    id: &ProjectId,
) -> Result<Option<(WorldBible, ThreeActStructure)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT bible_json, structure_json FROM world_bibles WHERE project_id = ?1",
            [id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((bible_json, structure_json)) = row else {
        return Ok(None);
    };
    let mut bible: WorldBible = serde_json::from_str(&bible_json)?;
    let structure: ThreeActStructure = from_json(Some(structure_json), "three-act structure");
    bible.plot_threads = load_threads(conn, id)?;
    Ok(Some((bible, structure)))
}

fn load_threads(conn: &Connection, id: &ProjectId) -> Result<Vec<PlotThread>> {
    let mut stmt = conn.prepare(
        "SELECT name, goal, status, last_updated_chapter FROM plot_threads
         WHERE project_id = ?1 ORDER BY position",
    )?;
    let threads = stmt
        .query_map([id.as_str()], |row| {
            Ok(PlotThread {
                name: row.get(0)?,
                goal: row.get(1)?,
                status: ThreadStatus::parse(&row.get::<_, String>(2)?),
                last_updated_chapter: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(threads)
}

/// Replace the thread list
pub fn save_threads(conn: &Connection, id: &ProjectId, threads: &[PlotThread]) -> Result<()> {
    conn.execute("DELETE FROM plot_threads WHERE project_id = ?1", [id.as_str()])?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO plot_threads
             (project_id, name, goal, status, last_updated_chapter, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (i, t) in threads.iter().enumerate() {
        stmt.execute(params![
            id.as_str(),
            t.name,
            t.goal,
            t.status.as_str(),
            t.last_updated_chapter,
            i as i64
        ])?;
    }
    Ok(())
}

/// Write the world bible, refusing contradictions of an existing one
pub fn save_world_bible(
    conn: &Connection,
    id: &ProjectId,
    bible: &WorldBible,
    structure: &ThreeActStructure,
) -> Result<()> {
    if let Some((previous, _)) = load_world_bible(conn, id)? {
        bible.ensure_continuity(&previous)?;
    }
    let mut stored = bible.clone();
    let threads = std::mem::take(&mut stored.plot_threads);
    conn.execute(
        "INSERT INTO world_bibles (project_id, bible_json, structure_json, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(project_id) DO UPDATE SET
             bible_json = excluded.bible_json,
             structure_json = excluded.structure_json,
             updated_at = excluded.updated_at",
        params![
            id.as_str(),
            serde_json::to_string(&stored)?,
            serde_json::to_string(structure)?,
            now()
        ],
    )?;
    save_threads(conn, id, &threads)
}

/// Commit an accepted outline: bible, threads, chapter rows and warnings
pub fn save_outline(conn: &Connection, id: &ProjectId, outline: &OutlineResult) -> Result<()> {
    save_world_bible(conn, id, &outline.world_bible, &outline.structure)?;
    let ts = now();
    let mut stmt = conn.prepare(
        "INSERT INTO chapters (project_id, number, outline_json, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(project_id, number) DO UPDATE SET outline_json = excluded.outline_json",
    )?;
    for entry in &outline.outline {
        stmt.execute(params![
            id.as_str(),
            entry.number,
            serde_json::to_string(entry)?,
            ts
        ])?;
    }
    conn.execute(
        "UPDATE projects SET outline_warnings_json = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(&outline.warnings)?, ts, id.as_str()],
    )?;
    debug!("Stored outline with {} chapters", outline.outline.len());
    Ok(())
}

fn update_chapter(
    conn: &Connection,
    id: &ProjectId,
    number: u32,
    sets: &str,
    extra: &[&dyn rusqlite::ToSql],
) -> Result<()> {
    let sql = format!(
        "UPDATE chapters SET {}, updated_at = ?{} WHERE project_id = ?{} AND number = ?{}",
        sets,
        extra.len() + 1,
        extra.len() + 2,
        extra.len() + 3
    );
    let ts = now();
    let id_str = id.as_str();
    let mut all: Vec<&dyn rusqlite::ToSql> = extra.to_vec();
    all.push(&ts);
    all.push(&id_str);
    all.push(&number);
    let changed = conn.execute(&sql, all.as_slice())?;
    if changed == 0 {
        return Err(NovelError::NotFound(format!("chapter {} of project {}", number, id)));
    }
    Ok(())
}

pub fn set_chapter_status(
    conn: &Connection,
    id: &ProjectId,
    number: u32,
    status: ChapterStatus,
) -> Result<()> {
    update_chapter(conn, id, number, "status = ?1", &[&status.as_str()])
}

pub fn save_plan(conn: &Connection, id: &ProjectId, number: u32, plan: &ChapterPlan) -> Result<()> {
    let json = serde_json::to_string(plan)?;
    update_chapter(
        conn,
        id,
        number,
        "plan_json = ?1, step = ?2, status = ?3",
        &[&json, &ChapterStep::Planned.as_str(), &ChapterStatus::Writing.as_str()],
    )
}

pub fn save_scene(conn: &Connection, id: &ProjectId, scene: &SceneRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO scenes (project_id, chapter, number, text, word_count,
                             suspected_truncation, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(project_id, chapter, number) DO UPDATE SET
             text = excluded.text,
             word_count = excluded.word_count,
             suspected_truncation = excluded.suspected_truncation",
        params![
            id.as_str(),
            scene.chapter,
            scene.number,
            scene.text,
            scene.word_count as i64,
            scene.suspected_truncation,
            now()
        ],
    )?;
    Ok(())
}

pub fn save_written(conn: &Connection, id: &ProjectId, number: u32, content: &str) -> Result<()> {
    let words = crate::types::count_words(content) as i64;
    update_chapter(
        conn,
        id,
        number,
        "content = ?1, word_count = ?2, step = ?3, status = ?4",
        &[&content, &words, &ChapterStep::Written.as_str(), &ChapterStatus::Editing.as_str()],
    )
}

pub fn save_audit(
    conn: &Connection,
    id: &ProjectId,
    number: u32,
    report: &AuditReport,
    content: &str,
    notes: &[String],
) -> Result<()> {
    let audit = serde_json::to_string(report)?;
    let notes = serde_json::to_string(notes)?;
    let words = crate::types::count_words(content) as i64;
    update_chapter(
        conn,
        id,
        number,
        "audit_json = ?1, content = ?2, word_count = ?3, notes_json = ?4, step = ?5",
        &[&audit, &content, &words, &notes, &ChapterStep::Audited.as_str()],
    )
}

/// Replace the chapter text after a full rewrite; the step stays `Audited`
pub fn save_rewrite(
    conn: &Connection,
    id: &ProjectId,
    number: u32,
    scenes: &[SceneRecord],
    rewrites: u32,
) -> Result<()> {
    conn.execute(
        "DELETE FROM scenes WHERE project_id = ?1 AND chapter = ?2",
        params![id.as_str(), number],
    )?;
    for scene in scenes {
        save_scene(conn, id, scene)?;
    }
    let content = crate::novel::types::assemble_chapter(scenes);
    let words = crate::types::count_words(&content) as i64;
    update_chapter(
        conn,
        id,
        number,
        "content = ?1, word_count = ?2, rewrites = ?3, status = ?4, step = ?5",
        &[
            &content,
            &words,
            &rewrites,
            &ChapterStatus::Revision.as_str(),
            &ChapterStep::Audited.as_str(),
        ],
    )
}

pub struct EditCommit<'a> {
    pub content: &'a str,
    pub logic_score: u8,
    pub style_score: u8,
    pub approved: bool,
    pub notes: &'a [String],
}

pub fn save_edit(
    conn: &Connection,
    id: &ProjectId,
    number: u32,
    edit: &EditCommit<'_>,
) -> Result<()> {
    let notes = serde_json::to_string(edit.notes)?;
    let words = crate::types::count_words(edit.content) as i64;
    update_chapter(
        conn,
        id,
        number,
        "content = ?1, word_count = ?2, logic_score = ?3, style_score = ?4, approved = ?5, \
         notes_json = ?6, step = ?7, status = ?8",
        &[
            &edit.content,
            &words,
            &edit.logic_score,
            &edit.style_score,
            &edit.approved,
            &notes,
            &ChapterStep::Edited.as_str(),
            &ChapterStatus::Editing.as_str(),
        ],
    )
}

pub fn save_summary(
    conn: &Connection,
    id: &ProjectId,
    number: u32,
    summary: &str,
    status: ChapterStatus,
) -> Result<()> {
    update_chapter(
        conn,
        id,
        number,
        "summary = ?1, step = ?2, status = ?3",
        &[&summary, &ChapterStep::Summarized.as_str(), &status.as_str()],
    )
}

/// Commit a pacing review: report, directive, review counter and threads
pub fn save_pacing(
    conn: &Connection,
    id: &ProjectId,
    after_chapter: u32,
    report: &PacingReport,
    threads: &[PlotThread],
    reviews_done: u32,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pacing_reports (project_id, after_chapter, report_json, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![id.as_str(), after_chapter, serde_json::to_string(report)?, now()],
    )?;
    conn.execute(
        "UPDATE projects SET pacing_directive = ?1, pacing_reviews_done = ?2,
             updated_at = ?3 WHERE id = ?4",
        params![report.directive, reviews_done, now(), id.as_str()],
    )?;
    save_threads(conn, id, threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::novel::types::NewProject;
    use serde_json::json;

    fn setup() -> (Database, Project) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let project = Project::from_request(NewProject {
            title: "Salt Road".into(),
            premise: "A smuggler inherits a ledger".into(),
            genre: "mystery".into(),
            tone: "tense".into(),
            chapter_count: 2,
            has_prologue: true,
            has_epilogue: false,
            has_author_note: false,
            style_notes: None,
        });
        db.transaction(|conn| insert_project(conn, &project)).unwrap();
        (db, project)
    }

    fn outline() -> OutlineResult {
        let bible: WorldBible = serde_json::from_value(json!({
            "characters": [{"name": "Mara", "role": "protagonist", "immutable": {"eyes": "grey"}}],
            "plot_threads": [{"name": "Ledger", "goal": "decode"}]
        }))
        .unwrap();
        let entries = (0..=2)
            .map(|n| {
                serde_json::from_value(json!({"number": n, "title": format!("T{}", n)})).unwrap()
            })
            .collect();
        OutlineResult {
            world_bible: bible,
            outline: entries,
            structure: ThreeActStructure::default(),
            warnings: vec![OutlineWarning::IncompleteArc {
                character: "Mara".into(),
                appearances: 1,
            }],
            gap_filled: false,
        }
    }

    #[test]
    fn test_project_roundtrip_and_prefix_lookup() {
        let (db, project) = setup();
        let store = ProjectStore::new(&db);
        let loaded = store.load_project(&project.id).unwrap();
        assert_eq!(loaded.title, "Salt Road");
        assert_eq!(loaded.status, ProjectStatus::Idle);
        assert!(loaded.has_prologue);

        let found = store.find_project(project.id.short()).unwrap();
        assert_eq!(found.id, project.id);
        assert!(matches!(
            store.find_project("zzzz"),
            Err(NovelError::NotFound(_))
        ));
    }

    #[test]
    fn test_outline_commit_creates_chapters_and_threads() {
        let (db, project) = setup();
        db.transaction(|conn| save_outline(conn, &project.id, &outline())).unwrap();

        let store = ProjectStore::new(&db);
        let chapters = store.load_chapters(&project.id).unwrap();
        assert_eq!(
            chapters.iter().map(|c| c.number).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(chapters.iter().all(|c| c.step == ChapterStep::Pending));

        let (bible, _) = store.load_world_bible(&project.id).unwrap().unwrap();
        assert_eq!(bible.plot_threads.len(), 1);
        assert_eq!(
            store.load_project(&project.id).unwrap().outline_warnings.len(),
            1
        );
    }

    #[test]
    fn test_world_bible_guard_blocks_contradiction() {
        let (db, project) = setup();
        db.transaction(|conn| save_outline(conn, &project.id, &outline())).unwrap();

        let mut changed = outline().world_bible;
        changed.characters[0].immutable.insert("eyes".into(), "green".into());
        let result = db.transaction(|conn| {
            save_world_bible(conn, &project.id, &changed, &ThreeActStructure::default())
        });
        assert!(matches!(result, Err(NovelError::Validation(_))));
    }

    #[test]
    fn test_status_transition_guard() {
        let (db, project) = setup();
        let start = |conn: &Connection| {
            transition_status(
                conn,
                &project.id,
                |s| s.can_start(),
                ProjectStatus::Generating,
                "start",
            )
        };
        db.transaction(start).unwrap();
        let again = db.transaction(start);
        assert!(matches!(again, Err(NovelError::InvalidTransition { .. })));
    }

    #[test]
    fn test_chapter_steps_and_usage() {
        let (db, project) = setup();
        db.transaction(|conn| save_outline(conn, &project.id, &outline())).unwrap();
        let scene = SceneRecord {
            chapter: 1,
            number: 1,
            text: "Fog covered the harbor.".into(),
            word_count: 4,
            suspected_truncation: false,
        };
        db.transaction(|conn| {
            save_scene(conn, &project.id, &scene)?;
            save_written(conn, &project.id, 1, &scene.text)?;
            add_usage(conn, &project.id, &TokenUsage::new(10, 20, 5))
        })
        .unwrap();

        let store = ProjectStore::new(&db);
        let chapter = store.load_chapter(&project.id, 1).unwrap();
        assert_eq!(chapter.step, ChapterStep::Written);
        assert_eq!(chapter.status, ChapterStatus::Editing);
        assert_eq!(chapter.word_count, 4);
        assert_eq!(store.load_scenes(&project.id, 1).unwrap(), vec![scene]);
        assert_eq!(store.load_project(&project.id).unwrap().usage.total(), 35);
    }

    #[test]
    fn test_control_request_roundtrip() {
        let (db, project) = setup();
        let store = ProjectStore::new(&db);
        assert_eq!(store.control_request(&project.id).unwrap(), None);
        store.set_control_request(&project.id, Some(ControlRequest::Pause)).unwrap();
        assert_eq!(
            store.control_request(&project.id).unwrap(),
            Some(ControlRequest::Pause)
        );
    }
}
