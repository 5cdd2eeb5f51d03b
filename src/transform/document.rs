//! Output document model

use serde::{Deserialize, Serialize};

/// One line of the output stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingDocument {
    pub id: String,
    pub key: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title: String,
    pub description: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub resolution: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub comments: Vec<Comment>,
    /// Single training passage: title, description and discussion
    pub text: String,
    pub tasks: Vec<TrainingTask>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: Option<String>,
    pub created: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summarization,
    Classification,
    QuestionAnswering,
}

/// Instruction-style example derived from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingTask {
    pub kind: TaskKind,
    pub instruction: String,
    pub input: String,
    pub output: String,
}

impl TrainingTask {
    fn new(
        kind: TaskKind,
        instruction: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            instruction: instruction.into(),
            input: input.into(),
            output: output.into(),
        }
    }
}

impl TrainingDocument {
    /// Start a document; `text` and `tasks` are derived in `build()`
    pub fn builder(
        key: impl Into<String>,
        collection: impl Into<String>,
        title: impl Into<String>,
    ) -> DocumentBuilder {
        let key = key.into();
        DocumentBuilder {
            doc: TrainingDocument {
                id: key.clone(),
                key,
                collection: collection.into(),
                url: None,
                title: title.into(),
                description: String::new(),
                status: None,
                priority: None,
                issue_type: None,
                labels: Vec::new(),
                components: Vec::new(),
                reporter: None,
                assignee: None,
                resolution: None,
                created: None,
                updated: None,
                comments: Vec::new(),
                text: String::new(),
                tasks: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    doc: TrainingDocument,
}

impl DocumentBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.doc.id = id.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.doc.url = Some(url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.doc.description = description.into();
        self
    }

    pub fn status(mut self, status: Option<String>) -> Self {
        self.doc.status = status;
        self
    }

    pub fn priority(mut self, priority: Option<String>) -> Self {
        self.doc.priority = priority;
        self
    }

    pub fn issue_type(mut self, issue_type: Option<String>) -> Self {
        self.doc.issue_type = issue_type;
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.doc.labels = labels;
        self
    }

    pub fn components(mut self, components: Vec<String>) -> Self {
        self.doc.components = components;
        self
    }

    pub fn reporter(mut self, reporter: Option<String>) -> Self {
        self.doc.reporter = reporter;
        self
    }

    pub fn assignee(mut self, assignee: Option<String>) -> Self {
        self.doc.assignee = assignee;
        self
    }

    pub fn resolution(mut self, resolution: Option<String>) -> Self {
        self.doc.resolution = resolution;
        self
    }

    pub fn created(mut self, created: Option<String>) -> Self {
        self.doc.created = created;
        self
    }

    pub fn updated(mut self, updated: Option<String>) -> Self {
        self.doc.updated = updated;
        self
    }

    pub fn comments(mut self, comments: Vec<Comment>) -> Self {
        self.doc.comments = comments;
        self
    }

    pub fn build(mut self) -> TrainingDocument {
        self.doc.text = passage(&self.doc);
        self.doc.tasks = derive_tasks(&self.doc);
        self.doc
    }
}

/// Title and description, without the discussion
fn issue_body(doc: &TrainingDocument) -> String {
    if doc.description.is_empty() {
        doc.title.clone()
    } else {
        format!("{}\n\n{}", doc.title, doc.description)
    }
}

fn passage(doc: &TrainingDocument) -> String {
    let mut text = issue_body(doc);
    for comment in &doc.comments {
        text.push_str("\n\n");
        if let Some(author) = &comment.author {
            text.push_str(author);
            text.push_str(": ");
        }
        text.push_str(&comment.body);
    }
    text
}

fn derive_tasks(doc: &TrainingDocument) -> Vec<TrainingTask> {
    let mut tasks = Vec::new();

    if !doc.description.is_empty() {
        tasks.push(TrainingTask::new(
            TaskKind::Summarization,
            "Summarize the following issue description in one line.",
            doc.description.clone(),
            doc.title.clone(),
        ));
    }

    let body = issue_body(doc);
    if let Some(status) = &doc.status {
        tasks.push(TrainingTask::new(
            TaskKind::Classification,
            "Classify the status of this issue.",
            body.clone(),
            status.clone(),
        ));
    }
    if let Some(priority) = &doc.priority {
        tasks.push(TrainingTask::new(
            TaskKind::Classification,
            "Classify the priority of this issue.",
            body.clone(),
            priority.clone(),
        ));
    }

    if let Some(last) = doc.comments.last() {
        tasks.push(TrainingTask::new(
            TaskKind::QuestionAnswering,
            "Based on the issue below, how did the discussion conclude?",
            body,
            last.body.clone(),
        ));
    }

    tasks
}
