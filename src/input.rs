use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::InputError;
use crate::models::DocumentId;

const URL_COLUMNS: [&str; 8] = [
    "pmc_url", "PMC URL", "pmc link", "PMC Link", "Link", "link", "URL", "url",
];

/// Column/value pairs of one input row, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMeta {
    fields: Vec<(String, String)>,
}

impl RowMeta {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Non-empty value of the first column named `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn exact(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    pub fn authors(&self) -> Vec<String> {
        self.get("authors").map(split_authors).unwrap_or_default()
    }

    pub fn year(&self) -> Option<&str> {
        self.get("year")
    }

    /// Per-row article link: preferred columns first, then any value that looks like a PMC URL.
    pub fn source_url(&self) -> Option<String> {
        if let Some(url) = URL_COLUMNS.iter().find_map(|key| self.exact(key)) {
            return Some(url_token(url).to_string());
        }
        self.fields
            .iter()
            .map(|(_, v)| v.trim())
            .find(|v| {
                let lowered = v.to_lowercase();
                lowered.contains("pmc") && lowered.contains("http")
            })
            .map(|v| url_token(v).to_string())
    }
}

/// The `http...` token of a free-text cell, or the whole cell.
fn url_token(value: &str) -> &str {
    match value.find("http") {
        Some(start) => value[start..].split_whitespace().next().unwrap_or(value),
        None => value,
    }
}

/// One unit of work for the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// 1-based position after de-duplication and limit.
    pub seq: usize,
    pub id: DocumentId,
    pub row: RowMeta,
    pub source_url: Option<String>,
}

/// Authors cell: `;`-separated when a semicolon is present, otherwise `,`.
pub fn split_authors(raw: &str) -> Vec<String> {
    let sep = if raw.contains(';') { ';' } else { ',' };
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Work items from an explicit ID list. Entries that are not IDs are skipped.
pub fn from_ids(raw: &[String], limit: Option<usize>) -> Result<Vec<WorkItem>, InputError> {
    let pairs = raw.iter().filter_map(|entry| {
        let id = DocumentId::parse(entry).or_else(|| DocumentId::find_in(entry));
        if id.is_none() {
            warn!("Ignoring {:?}: not a PMC identifier", entry);
        }
        id.map(|id| (id, RowMeta::default()))
    });
    finish(pairs, limit, "the ID list")
}

/// Work items from a CSV file with a header row.
pub fn from_csv(path: &Path, limit: Option<usize>) -> Result<Vec<WorkItem>, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = read_rows(file).map_err(|source| InputError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded {} rows from {}", rows.len(), path.display());

    let pairs = rows.into_iter().enumerate().filter_map(|(idx, row)| {
        let id = derive_id(&row);
        if id.is_none() {
            warn!("Skipping row {}: no PMCID detected", idx + 1);
        }
        id.map(|id| (id, row))
    });
    finish(pairs, limit, &path.display().to_string())
}

fn read_rows<R: Read>(reader: R) -> Result<Vec<RowMeta>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        rows.push(RowMeta::new(fields));
    }
    Ok(rows)
}

fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A `pmcid` column decides on its own. Without one, the first qualifying column wins.
fn derive_id(row: &RowMeta) -> Option<DocumentId> {
    if let Some((_, value)) = row.fields.iter().find(|(k, _)| normalize_header(k) == "pmcid") {
        return DocumentId::find_in(value);
    }
    row.fields.iter().find_map(|(key, value)| {
        let key = key.to_lowercase();
        let lowered = value.to_lowercase();
        let qualifies = key.contains("pmc")
            || key.contains("link")
            || lowered.contains("pmc")
            || lowered.contains("link");
        if qualifies {
            DocumentId::find_in(value)
        } else {
            None
        }
    })
}

fn finish(
    pairs: impl Iterator<Item = (DocumentId, RowMeta)>,
    limit: Option<usize>,
    origin: &str,
) -> Result<Vec<WorkItem>, InputError> {
    let mut seen = HashSet::new();
    let items: Vec<WorkItem> = pairs
        .filter(|(id, _)| {
            let fresh = seen.insert(id.clone());
            if !fresh {
                debug!(pmcid = %id, "dropping duplicate input ID");
            }
            fresh
        })
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(idx, (id, row))| WorkItem {
            seq: idx + 1,
            source_url: row.source_url(),
            id,
            row,
        })
        .collect();

    if items.is_empty() {
        return Err(InputError::NoIds {
            origin: origin.to_string(),
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn id_found_in_link_cell_without_id_column() {
        let file = csv_file("Title,Link\nRoots,see https://pmc.ncbi.nlm.nih.gov/articles/PMC4136787/\n");
        let items = from_csv(file.path(), None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_str(), "PMC4136787");
        assert_eq!(items[0].seq, 1);
        assert_eq!(
            items[0].source_url.as_deref(),
            Some("https://pmc.ncbi.nlm.nih.gov/articles/PMC4136787/")
        );
        assert_eq!(items[0].row.title(), Some("Roots"));
    }

    #[test]
    fn pmcid_column_is_authoritative() {
        let file = csv_file("Title,PMCID #,Link\nA,pmc22,https://pmc.ncbi.nlm.nih.gov/articles/PMC11/\nB,,https://pmc.ncbi.nlm.nih.gov/articles/PMC33/\n");
        let items = from_csv(file.path(), None).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["PMC22"]);
    }

    #[test]
    fn duplicates_dropped_then_limit_applied() {
        let file = csv_file("pmcid,title\nPMC1,a\nPMC1,dup\nPMC2,b\nPMC3,c\n");
        let items = from_csv(file.path(), Some(2)).unwrap();
        let ids: Vec<_> = items.iter().map(|i| (i.seq, i.id.as_str())).collect();
        assert_eq!(ids, [(1, "PMC1"), (2, "PMC2")]);
        assert_eq!(items[0].row.title(), Some("a"));
    }

    #[test]
    fn rows_without_ids_are_skipped() {
        let file = csv_file("title,notes\nNo id here,nothing\nSecond,PMC77 pmc listing\n");
        let items = from_csv(file.path(), None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_str(), "PMC77");
    }

    #[test]
    fn empty_input_is_an_error() {
        let file = csv_file("title,year\nNothing,2020\n");
        assert!(matches!(from_csv(file.path(), None), Err(InputError::NoIds { .. })));
        assert!(matches!(from_ids(&["doi:1".into()], None), Err(InputError::NoIds { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = from_csv(Path::new("/definitely/not/here.csv"), None).unwrap_err();
        assert!(matches!(err, InputError::Io { .. }));
    }

    #[test]
    fn explicit_ids_are_normalized() {
        let items = from_ids(&["pmc5".into(), " PMC6 ".into(), "PMC5".into()], None).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["PMC5", "PMC6"]);
        assert!(items[0].source_url.is_none());
    }

    #[test]
    fn authors_split_on_semicolon_first() {
        assert_eq!(split_authors("Doe, J.; Roe, K."), ["Doe, J.", "Roe, K."]);
        assert_eq!(split_authors("Doe J, Roe K, "), ["Doe J", "Roe K"]);
    }

    #[test]
    fn row_lookup_ignores_case() {
        let row = RowMeta::new(vec![("Year".into(), " 2019 ".into()), ("AUTHORS".into(), "A; B".into())]);
        assert_eq!(row.year(), Some("2019"));
        assert_eq!(row.authors(), ["A", "B"]);
        assert!(row.title().is_none());
    }
}
