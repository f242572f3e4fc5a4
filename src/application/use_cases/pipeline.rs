//! End-to-end analytics request: question in, critiqued answer out.
//!
//! Stage order is fixed: SQL generation, query execution, the three analyses, enrichment,
//! response generation, critique. Only the first, second, fourth and fifth stages can fail
//! the request.

use crate::application::use_cases::analysis::AnalysisUseCase;
use crate::application::use_cases::critical_analysis::CriticalAnalysisUseCase;
use crate::application::use_cases::enrichment::ResponseEnrichmentUseCase;
use crate::application::use_cases::insights::{InsightGenerator, TableInsightGenerator};
use crate::application::use_cases::prompts::PromptLibrary;
use crate::application::use_cases::response_generation::ResponseGenerationUseCase;
use crate::application::use_cases::sql_generation::SqlGenerationUseCase;
use crate::domain::error::Result;
use crate::domain::query_context::{QueryContext, QueryRequest};
use crate::domain::session::SessionContext;
use crate::infrastructure::config::ConfigService;
use crate::infrastructure::db::{QueryExecutor, SchemaIntrospector, SqlDatabase};
use crate::infrastructure::llm_clients::{LLMClient, ModelBackend, RouterClient};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsAnswer {
    pub request_id: String,
    pub query: String,
    pub answer: String,
}

pub struct AnalyticsPipeline {
    sql_generation: SqlGenerationUseCase,
    executor: Arc<dyn QueryExecutor + Send + Sync>,
    analysis: AnalysisUseCase,
    enrichment: ResponseEnrichmentUseCase,
    critical_analysis: CriticalAnalysisUseCase,
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    config: Arc<ConfigService>,
    prompts: PromptLibrary,
}

impl AnalyticsPipeline {
    pub fn new(
        introspector: Arc<dyn SchemaIntrospector + Send + Sync>,
        executor: Arc<dyn QueryExecutor + Send + Sync>,
        llm_client: Arc<dyn LLMClient + Send + Sync>,
        config: Arc<ConfigService>,
    ) -> Self {
        let prompts = PromptLibrary::default();
        let critique_backend = config.config().critique.enabled.then(|| {
            ModelBackend::new(
                ModelBackend::CRITIQUE,
                llm_client.clone(),
                config.critique_llm_config(),
            )
        });

        Self {
            sql_generation: SqlGenerationUseCase::new(introspector),
            analysis: AnalysisUseCase::new(executor.clone()),
            enrichment: ResponseEnrichmentUseCase::new(Arc::new(TableInsightGenerator::new(
                executor.clone(),
            ))),
            critical_analysis: CriticalAnalysisUseCase::new(
                critique_backend,
                prompts.critical_analysis_prompt().clone(),
            ),
            executor,
            llm_client,
            config,
            prompts,
        }
    }

    /// Wires the pipeline to one database and the provider router built from configuration.
    pub fn from_database(database: Arc<SqlDatabase>, config: Arc<ConfigService>) -> Self {
        let llm_client = Arc::new(RouterClient::from_config(&config));
        Self::new(database.clone(), database, llm_client, config)
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.critical_analysis = CriticalAnalysisUseCase::new(
            self.critical_analysis.backend().cloned(),
            prompts.critical_analysis_prompt().clone(),
        );
        self.prompts = prompts;
        self
    }

    pub fn with_insight_generator(
        mut self,
        insights: Arc<dyn InsightGenerator + Send + Sync>,
    ) -> Self {
        self.enrichment = ResponseEnrichmentUseCase::new(insights);
        self
    }

    /// The user-selected model for this request.
    pub fn primary_backend(&self, session: &SessionContext) -> ModelBackend {
        ModelBackend::new(
            ModelBackend::PRIMARY,
            self.llm_client.clone(),
            self.config.llm_config(
                session.llm_provider,
                session.llm_model_name.as_deref(),
                session.llm_temperature,
            ),
        )
    }

    pub fn critique_backend(&self) -> Option<&ModelBackend> {
        self.critical_analysis.backend()
    }

    pub async fn run(
        &self,
        request: QueryRequest,
        session: &SessionContext,
    ) -> Result<AnalyticsAnswer> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "analytics_request",
            request_id = %request_id,
            provider = %session.llm_provider,
            model = session.llm_model_name.as_deref().unwrap_or("default"),
        );

        async move {
            let start = Instant::now();
            let (query, answer) = self.process(request, session).await?;
            info!(
                elapsed_ms = (start.elapsed().as_millis() as u64),
                "Analytics request completed"
            );
            Ok(AnalyticsAnswer {
                request_id,
                query,
                answer,
            })
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: QueryRequest,
        session: &SessionContext,
    ) -> Result<(String, String)> {
        request.validate_request().map_err(|e| {
            error!("Rejected request: {}", e);
            e
        })?;

        let primary = self.primary_backend(session);

        let generated = self
            .sql_generation
            .execute(&request, &primary, self.prompts.sql_prompt())
            .await?;

        let response = self
            .executor
            .run_query(&generated.query)
            .await
            .map_err(|e| {
                error!(query = %generated.query, "Error running query: {}", e);
                e
            })?;
        info!(rows = ?response.row_count(), "Query executed");

        let analyses = self
            .analysis
            .run_all(&generated.schema, &request.selected_tables)
            .await;

        let context = QueryContext {
            question: request.question,
            selected_tables: request.selected_tables,
            schema: generated.schema,
            query: generated.query.clone(),
            response,
            analyses,
        };

        let payload = self.enrichment.execute(context, session).await?;
        let answer = ResponseGenerationUseCase::execute(
            &payload,
            &primary,
            self.prompts.response_prompt(),
        )
        .await?;

        let answer = self.critical_analysis.augment(&answer).await;
        Ok((generated.query, answer))
    }
}
