//! Typed client for the public-works catalogue served by the upstream.
//!
//! The dashboard asks for `obrasServicosDetails` and, per project, the most
//! recent site photo of the project's information panel (`fotoMedicao`). This
//! module builds those documents, sends them through a [`Relay`] so the same
//! envelope validation applies, and normalizes the records the way the kiosk
//! displays them.

use crate::error::{Error, Result};
use crate::relay::Relay;
use crate::types::{ForwardMode, QueryRequest};
use crate::upstream::Upstream;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Municipality the dashboard was deployed for
pub const DEFAULT_ENTITY: u32 = 141;

const PANEL_MARKER: &str = "painel";
const PHOTO_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// Query listing every project of an entity
pub fn projects_query(entity: u32) -> String {
    format!(
        r#"query {{
  obrasServicosDetails(entidade: {entity}) {{
    id
    apelido
    numero
    situacao
    localizacao
    regiao
    numero_contrato
    nome_contratado
    valor_total_contratos
    progresso
    data_inicio
    previsao_termino
  }}
}}"#
    )
}

/// Query listing the site diaries and photo names of every project
pub fn panel_photos_query(entity: u32) -> String {
    format!(
        r#"query {{
  obrasServicosDetails(entidade: {entity}) {{
    id
    lotes {{
      diarios {{
        id
        data
        fotos {{
          name
        }}
      }}
    }}
  }}
}}"#
    )
}

/// Query resolving a diary photo to a downloadable URL
pub fn photo_url_query(entity: u32, diary_id: i64, name: &str) -> String {
    format!(
        r#"query {{
  fotoMedicao(entidade: {entity}, id: {diary_id}, name: "{}", url: true, diario: true)
}}"#,
        escape_graphql_string(name)
    )
}

fn escape_graphql_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Project record as the upstream returns it
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawProject {
    pub id: i64,
    #[serde(default)]
    pub apelido: Option<String>,
    #[serde(default)]
    pub numero: Option<serde_json::Value>,
    #[serde(default)]
    pub situacao: Option<String>,
    #[serde(default)]
    pub localizacao: Option<String>,
    #[serde(default)]
    pub regiao: Option<String>,
    #[serde(default)]
    pub numero_contrato: Option<serde_json::Value>,
    #[serde(default)]
    pub nome_contratado: Option<String>,
    #[serde(default)]
    pub valor_total_contratos: Option<f64>,
    #[serde(default)]
    pub progresso: Option<f64>,
    #[serde(default)]
    pub data_inicio: Option<String>,
    #[serde(default)]
    pub previsao_termino: Option<String>,
}

/// Project as displayed on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: i64,
    pub description: String,
    pub region: String,
    pub total_value: f64,
    pub contractor: String,
    pub progress: f64,
    pub start_date: Option<String>,
    pub expected_end: Option<String>,
    pub status: String,
    pub location: String,
}

impl Project {
    /// Apply the display fallbacks to a raw record
    pub fn from_raw(raw: RawProject) -> Self {
        let description = non_blank(raw.apelido).unwrap_or_else(|| {
            let number = match raw.numero {
                Some(serde_json::Value::String(s)) => s,
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            format!("Obra {number}")
        });

        Self {
            id: raw.id,
            description,
            region: non_blank(raw.regiao).unwrap_or_else(|| "Desconhecida".to_string()),
            total_value: raw.valor_total_contratos.unwrap_or(0.0),
            contractor: non_blank(raw.nome_contratado)
                .unwrap_or_else(|| "Não informado".to_string()),
            progress: raw.progresso.unwrap_or(0.0),
            start_date: raw.data_inicio,
            expected_end: raw.previsao_termino,
            status: non_blank(raw.situacao).unwrap_or_else(|| "Em andamento".to_string()),
            location: non_blank(raw.localizacao)
                .unwrap_or_else(|| "Local não especificado".to_string()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Number of projects per region, ordered by region name
pub fn projects_by_region(projects: &[Project]) -> BTreeMap<String, usize> {
    let mut tally = BTreeMap::new();
    for project in projects {
        *tally.entry(project.region.clone()).or_insert(0) += 1;
    }
    tally
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProjectPhotos {
    pub id: i64,
    #[serde(default)]
    pub lotes: Vec<RawLot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLot {
    #[serde(default)]
    pub diarios: Vec<RawDiary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDiary {
    pub id: i64,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub fotos: Vec<RawPhoto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPhoto {
    pub name: String,
}

/// Photo chosen to illustrate a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelPhoto {
    pub diary_id: i64,
    pub date: Option<String>,
    pub name: String,
}

fn is_panel_photo(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains(PANEL_MARKER) && PHOTO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Lenient date parsing for diary dates. `None` when no format matches.
pub fn parse_diary_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Pick the first panel photo of the most recent diary that has one.
///
/// Diaries whose date cannot be parsed lose to any dated diary; among equal
/// dates the earliest listed diary wins.
pub fn select_panel_photo(project: &RawProjectPhotos) -> Option<PanelPhoto> {
    let mut best: Option<(Option<NaiveDateTime>, PanelPhoto)> = None;

    for diary in project.lotes.iter().flat_map(|lot| &lot.diarios) {
        let Some(photo) = diary.fotos.iter().find(|f| is_panel_photo(&f.name)) else {
            continue;
        };
        let parsed = diary.data.as_deref().and_then(parse_diary_date);
        let newer = match &best {
            None => true,
            Some((best_date, _)) => parsed > *best_date,
        };
        if newer {
            best = Some((
                parsed,
                PanelPhoto {
                    diary_id: diary.id,
                    date: diary.data.clone(),
                    name: photo.name.clone(),
                },
            ));
        }
    }

    best.map(|(_, photo)| photo)
}

/// Client for the catalogue queries
#[derive(Clone, Debug)]
pub struct ProjectsClient {
    relay: Relay,
    entity: u32,
}

impl ProjectsClient {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        Self {
            relay: Relay::new(upstream).with_forward_mode(ForwardMode::FullBody),
            entity: DEFAULT_ENTITY,
        }
    }

    /// Query a different entity
    pub fn with_entity(mut self, entity: u32) -> Self {
        self.entity = entity;
        self
    }

    pub fn entity(&self) -> u32 {
        self.entity
    }

    /// Run a query and return its `data` member.
    ///
    /// A `null` data with GraphQL errors is reported as a malformed response
    /// carrying the first error message.
    pub async fn query(&self, request: &QueryRequest) -> Result<serde_json::Value> {
        let body = serde_json::to_vec(request)?;
        let reply = self.relay.forward(&body.into()).await?;

        let mut envelope: serde_json::Value = serde_json::from_slice(&reply)?;
        let data = envelope
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or_default();
        if data.is_null() {
            let message = envelope
                .pointer("/errors/0/message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("upstream returned no data");
            return Err(Error::MalformedUpstreamResponse(message.to_string()));
        }
        Ok(data)
    }

    /// All projects of the entity, normalized for display
    pub async fn projects(&self) -> Result<Vec<Project>> {
        let data = self
            .query(&QueryRequest::new(projects_query(self.entity)))
            .await?;
        let raw: Vec<RawProject> = take_field(data, "obrasServicosDetails")?;
        Ok(raw.into_iter().map(Project::from_raw).collect())
    }

    /// URL of the latest panel photo of a project, if it has one
    pub async fn panel_photo_url(&self, project_id: i64) -> Result<Option<String>> {
        let data = self
            .query(&QueryRequest::new(panel_photos_query(self.entity)))
            .await?;
        let projects: Vec<RawProjectPhotos> = take_field(data, "obrasServicosDetails")?;

        let Some(photo) = projects
            .iter()
            .find(|p| p.id == project_id)
            .and_then(select_panel_photo)
        else {
            return Ok(None);
        };

        tracing::debug!(project_id, diary_id = photo.diary_id, name = %photo.name, "panel photo selected");

        let data = self
            .query(&QueryRequest::new(photo_url_query(
                self.entity,
                photo.diary_id,
                &photo.name,
            )))
            .await?;
        Ok(data
            .get("fotoMedicao")
            .and_then(serde_json::Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string))
    }
}

fn take_field<T: serde::de::DeserializeOwned>(
    mut data: serde_json::Value,
    field: &str,
) -> Result<T> {
    let value = data
        .get_mut(field)
        .map(serde_json::Value::take)
        .ok_or_else(|| {
            Error::MalformedUpstreamResponse(format!("missing field 'data.{field}'"))
        })?;
    serde_json::from_value(value).map_err(|e| {
        Error::MalformedUpstreamResponse(format!("unexpected 'data.{field}' shape: {e}"))
    })
}
