//! Locale-tolerant keyword tables.
//!
//! Every piece of free text that selects a typed value (section headings,
//! metadata keys, step keys, type names) goes through one of the static
//! tables below. Adding a synonym is a single table edit; adding a new kind
//! is an enum variant, which the compiler then forces every `match` to handle.

use mdflow_types::document::{Priority, SectionKind, StepKind, VariableKind, WorkflowStatus};

/// Metadata fields addressable from `key: value` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetadataKey {
    Title,
    Description,
    Author,
    Version,
    Tags,
    Priority,
    Status,
    Created,
    Updated,
}

/// Recognised key lines inside a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepKey {
    Id,
    Type,
    Command,
    DependsOn,
    Parameters,
    Condition,
    Timeout,
    Retryable,
    Description,
    Workflow,
}

/// Required/optional flag of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Requirement {
    Required,
    Optional,
}

/// Attribute keys inside a variable declaration's parentheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VariableAttribute {
    Default,
    Values,
}

const SECTIONS: &[(&str, SectionKind)] = &[
    ("metadata", SectionKind::Metadata),
    ("meta", SectionKind::Metadata),
    ("properties", SectionKind::Metadata),
    ("info", SectionKind::Metadata),
    ("метаданные", SectionKind::Metadata),
    ("свойства", SectionKind::Metadata),
    ("variables", SectionKind::Variables),
    ("vars", SectionKind::Variables),
    ("inputs", SectionKind::Variables),
    ("переменные", SectionKind::Variables),
    ("параметры", SectionKind::Variables),
    ("steps", SectionKind::Steps),
    ("workflow steps", SectionKind::Steps),
    ("tasks", SectionKind::Steps),
    ("шаги", SectionKind::Steps),
    ("этапы", SectionKind::Steps),
    ("задачи", SectionKind::Steps),
    ("description", SectionKind::Description),
    ("overview", SectionKind::Description),
    ("summary", SectionKind::Description),
    ("описание", SectionKind::Description),
    ("обзор", SectionKind::Description),
    ("notes", SectionKind::Notes),
    ("remarks", SectionKind::Notes),
    ("заметки", SectionKind::Notes),
    ("примечания", SectionKind::Notes),
];

const METADATA_KEYS: &[(&str, MetadataKey)] = &[
    ("title", MetadataKey::Title),
    ("name", MetadataKey::Title),
    ("название", MetadataKey::Title),
    ("description", MetadataKey::Description),
    ("описание", MetadataKey::Description),
    ("author", MetadataKey::Author),
    ("owner", MetadataKey::Author),
    ("автор", MetadataKey::Author),
    ("version", MetadataKey::Version),
    ("версия", MetadataKey::Version),
    ("tags", MetadataKey::Tags),
    ("labels", MetadataKey::Tags),
    ("теги", MetadataKey::Tags),
    ("метки", MetadataKey::Tags),
    ("priority", MetadataKey::Priority),
    ("приоритет", MetadataKey::Priority),
    ("status", MetadataKey::Status),
    ("статус", MetadataKey::Status),
    ("created", MetadataKey::Created),
    ("created at", MetadataKey::Created),
    ("создан", MetadataKey::Created),
    ("updated", MetadataKey::Updated),
    ("updated at", MetadataKey::Updated),
    ("обновлен", MetadataKey::Updated),
    ("обновлён", MetadataKey::Updated),
];

const STEP_KEYS: &[(&str, StepKey)] = &[
    ("id", StepKey::Id),
    ("identifier", StepKey::Id),
    ("идентификатор", StepKey::Id),
    ("type", StepKey::Type),
    ("kind", StepKey::Type),
    ("тип", StepKey::Type),
    ("command", StepKey::Command),
    ("run", StepKey::Command),
    ("команда", StepKey::Command),
    ("dependson", StepKey::DependsOn),
    ("depends on", StepKey::DependsOn),
    ("depends", StepKey::DependsOn),
    ("after", StepKey::DependsOn),
    ("зависит от", StepKey::DependsOn),
    ("зависимости", StepKey::DependsOn),
    ("parameters", StepKey::Parameters),
    ("params", StepKey::Parameters),
    ("параметры", StepKey::Parameters),
    ("condition", StepKey::Condition),
    ("when", StepKey::Condition),
    ("условие", StepKey::Condition),
    ("timeout", StepKey::Timeout),
    ("таймаут", StepKey::Timeout),
    ("retryable", StepKey::Retryable),
    ("retry", StepKey::Retryable),
    ("повтор", StepKey::Retryable),
    ("description", StepKey::Description),
    ("описание", StepKey::Description),
    ("workflow", StepKey::Workflow),
    ("subworkflow", StepKey::Workflow),
    ("процесс", StepKey::Workflow),
];

const STEP_KINDS: &[(&str, StepKind)] = &[
    ("task", StepKind::Task),
    ("command", StepKind::Task),
    ("задача", StepKind::Task),
    ("condition", StepKind::Condition),
    ("conditional", StepKind::Condition),
    ("if", StepKind::Condition),
    ("условие", StepKind::Condition),
    ("loop", StepKind::Loop),
    ("foreach", StepKind::Loop),
    ("цикл", StepKind::Loop),
    ("parallel", StepKind::Parallel),
    ("параллельно", StepKind::Parallel),
    ("delay", StepKind::Delay),
    ("wait", StepKind::Delay),
    ("задержка", StepKind::Delay),
    ("subworkflow", StepKind::SubWorkflow),
    ("sub-workflow", StepKind::SubWorkflow),
    ("sub_workflow", StepKind::SubWorkflow),
    ("workflow", StepKind::SubWorkflow),
    ("подпроцесс", StepKind::SubWorkflow),
];

const VARIABLE_KINDS: &[(&str, VariableKind)] = &[
    ("string", VariableKind::String),
    ("str", VariableKind::String),
    ("text", VariableKind::String),
    ("строка", VariableKind::String),
    ("number", VariableKind::Number),
    ("int", VariableKind::Number),
    ("integer", VariableKind::Number),
    ("float", VariableKind::Number),
    ("decimal", VariableKind::Number),
    ("число", VariableKind::Number),
    ("boolean", VariableKind::Boolean),
    ("bool", VariableKind::Boolean),
    ("логический", VariableKind::Boolean),
    ("datetime", VariableKind::DateTime),
    ("date", VariableKind::DateTime),
    ("timestamp", VariableKind::DateTime),
    ("дата", VariableKind::DateTime),
    ("filepath", VariableKind::FilePath),
    ("file", VariableKind::FilePath),
    ("path", VariableKind::FilePath),
    ("путь", VariableKind::FilePath),
    ("url", VariableKind::Url),
    ("uri", VariableKind::Url),
    ("json", VariableKind::Json),
    ("object", VariableKind::Json),
    ("stringarray", VariableKind::StringArray),
    ("string[]", VariableKind::StringArray),
    ("array", VariableKind::StringArray),
    ("list", VariableKind::StringArray),
    ("список", VariableKind::StringArray),
];

const REQUIREMENTS: &[(&str, Requirement)] = &[
    ("required", Requirement::Required),
    ("mandatory", Requirement::Required),
    ("обязательная", Requirement::Required),
    ("обязательный", Requirement::Required),
    ("обязательно", Requirement::Required),
    ("optional", Requirement::Optional),
    ("необязательная", Requirement::Optional),
    ("необязательный", Requirement::Optional),
    ("опционально", Requirement::Optional),
];

const VARIABLE_ATTRIBUTES: &[(&str, VariableAttribute)] = &[
    ("default", VariableAttribute::Default),
    ("по умолчанию", VariableAttribute::Default),
    ("values", VariableAttribute::Values),
    ("allowed", VariableAttribute::Values),
    ("enum", VariableAttribute::Values),
    ("значения", VariableAttribute::Values),
];

const PRIORITIES: &[(&str, Priority)] = &[
    ("low", Priority::Low),
    ("низкий", Priority::Low),
    ("normal", Priority::Normal),
    ("medium", Priority::Normal),
    ("обычный", Priority::Normal),
    ("средний", Priority::Normal),
    ("high", Priority::High),
    ("высокий", Priority::High),
    ("critical", Priority::Critical),
    ("urgent", Priority::Critical),
    ("критический", Priority::Critical),
];

const STATUSES: &[(&str, WorkflowStatus)] = &[
    ("draft", WorkflowStatus::Draft),
    ("черновик", WorkflowStatus::Draft),
    ("ready", WorkflowStatus::Ready),
    ("готов", WorkflowStatus::Ready),
    ("running", WorkflowStatus::Running),
    ("выполняется", WorkflowStatus::Running),
    ("completed", WorkflowStatus::Completed),
    ("завершен", WorkflowStatus::Completed),
    ("завершён", WorkflowStatus::Completed),
    ("failed", WorkflowStatus::Failed),
    ("ошибка", WorkflowStatus::Failed),
    ("paused", WorkflowStatus::Paused),
    ("приостановлен", WorkflowStatus::Paused),
    ("cancelled", WorkflowStatus::Cancelled),
    ("canceled", WorkflowStatus::Cancelled),
    ("отменен", WorkflowStatus::Cancelled),
    ("отменён", WorkflowStatus::Cancelled),
];

const TRUE_WORDS: &[&str] = &["true", "yes", "y", "on", "1", "да"];
const FALSE_WORDS: &[&str] = &["false", "no", "n", "off", "0", "нет"];

/// Lowercase, trim, and drop markdown decoration (`**`, backticks, trailing colon).
pub(crate) fn normalize_keyword(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '*' || c == '`' || c == '_')
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
}

fn lookup<T: Copy>(table: &[(&str, T)], text: &str) -> Option<T> {
    let key = normalize_keyword(text);
    table
        .iter()
        .find(|(word, _)| *word == key)
        .map(|(_, value)| *value)
}

/// Section kind for a heading title. Unmatched titles are `Unknown`.
pub(crate) fn section_kind(title: &str) -> SectionKind {
    // "2. Steps" and "Steps (build)" both count as Steps.
    let title = title
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == ' ');
    let head = title.split('(').next().unwrap_or(title);
    lookup(SECTIONS, head).unwrap_or(SectionKind::Unknown)
}

pub(crate) fn metadata_key(key: &str) -> Option<MetadataKey> {
    lookup(METADATA_KEYS, key)
}

pub(crate) fn step_key(key: &str) -> Option<StepKey> {
    lookup(STEP_KEYS, key)
}

pub(crate) fn step_kind(value: &str) -> Option<StepKind> {
    lookup(STEP_KINDS, value)
}

pub(crate) fn variable_kind(value: &str) -> Option<VariableKind> {
    lookup(VARIABLE_KINDS, value)
}

pub(crate) fn requirement(value: &str) -> Option<Requirement> {
    lookup(REQUIREMENTS, value)
}

pub(crate) fn variable_attribute(key: &str) -> Option<VariableAttribute> {
    lookup(VARIABLE_ATTRIBUTES, key)
}

pub(crate) fn priority(value: &str) -> Option<Priority> {
    lookup(PRIORITIES, value)
}

pub(crate) fn status(value: &str) -> Option<WorkflowStatus> {
    lookup(STATUSES, value)
}

pub(crate) fn boolean(value: &str) -> Option<bool> {
    let key = normalize_keyword(value);
    if TRUE_WORDS.contains(&key.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&key.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Strip a `Workflow:` style prefix from an H1 title.
pub(crate) fn strip_title_prefix(title: &str) -> &str {
    const PREFIXES: &[&str] = &["workflow:", "рабочий процесс:", "процесс:"];
    let lower = title.to_lowercase();
    for prefix in PREFIXES {
        if lower.starts_with(prefix) {
            // Prefixes are matched case-insensitively, so slice by char count.
            let skip = prefix.chars().count();
            let offset = title
                .char_indices()
                .nth(skip)
                .map(|(i, _)| i)
                .unwrap_or(title.len());
            return title[offset..].trim();
        }
    }
    title.trim()
}

/// True when the H1 title carries an explicit workflow prefix.
pub(crate) fn has_title_prefix(title: &str) -> bool {
    strip_title_prefix(title).len() != title.trim().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_kind_multi_locale() {
        assert_eq!(section_kind("Steps"), SectionKind::Steps);
        assert_eq!(section_kind("STEPS"), SectionKind::Steps);
        assert_eq!(section_kind("Шаги"), SectionKind::Steps);
        assert_eq!(section_kind("Переменные"), SectionKind::Variables);
        assert_eq!(section_kind("2. Metadata"), SectionKind::Metadata);
        assert_eq!(section_kind("Steps (deploy)"), SectionKind::Steps);
        assert_eq!(section_kind("Troubleshooting"), SectionKind::Unknown);
    }

    #[test]
    fn test_step_key_tolerates_decoration() {
        assert_eq!(step_key("**Type**"), Some(StepKey::Type));
        assert_eq!(step_key("DependsOn"), Some(StepKey::DependsOn));
        assert_eq!(step_key("Depends On"), Some(StepKey::DependsOn));
        assert_eq!(step_key("Команда"), Some(StepKey::Command));
        assert_eq!(step_key("Owner"), None);
    }

    #[test]
    fn test_type_tables() {
        assert_eq!(step_kind("SubWorkflow"), Some(StepKind::SubWorkflow));
        assert_eq!(variable_kind("number"), Some(VariableKind::Number));
        assert_eq!(variable_kind("string[]"), Some(VariableKind::StringArray));
        assert_eq!(requirement("Обязательная"), Some(Requirement::Required));
        assert_eq!(priority("High"), Some(Priority::High));
        assert_eq!(status("cancelled"), Some(WorkflowStatus::Cancelled));
        assert_eq!(boolean("Да"), Some(true));
        assert_eq!(boolean("maybe"), None);
    }

    #[test]
    fn test_strip_title_prefix() {
        assert_eq!(strip_title_prefix("Workflow: Release"), "Release");
        assert_eq!(strip_title_prefix("workflow:Release"), "Release");
        assert_eq!(strip_title_prefix("Рабочий процесс: Сборка"), "Сборка");
        assert_eq!(strip_title_prefix("Release"), "Release");
        assert!(has_title_prefix("Workflow: Release"));
        assert!(!has_title_prefix("Release"));
    }
}
