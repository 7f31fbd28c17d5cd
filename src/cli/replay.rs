// src/cli/replay.rs
//! Replay 命令 - 在内存文档上重放通知场景
//!
//! 场景文件为 JSON：
//! ```json
//! {
//!   "containers": [
//!     { "id": "main", "notifications": [
//!       { "id": "n1", "category": "error", "text": "BacklogWiki sync failed" }
//!     ] }
//!   ],
//!   "steps": [
//!     { "action": "add_notification", "container": "main", "id": "n2", "category": "info", "text": "Saved" },
//!     { "action": "flush" },
//!     { "action": "remove_container", "id": "main" }
//!   ]
//! }
//! ```
//!
//! `containers` 在过滤器启动前就已在文档中。修改类步骤只改 DOM，
//! 变更批次在 `flush`（微任务检查点）、`paint`（检查点后再渲染一帧）或 `wait` 时投递；
//! 所有步骤结束后运行到空闲。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FilterConfig;
use crate::dom::{Document, Node};
use crate::notification::{is_suppressed, FilterStats, NotificationFilter};

/// Replay 命令参数
#[derive(Args)]
pub struct ReplayArgs {
    /// 场景文件 (JSON)
    pub scenario: PathBuf,

    /// 配置文件，默认读取 ~/.config/limeade/config.json
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSpec {
    pub id: String,
    /// 覆盖容器 class，用于模拟非通知容器
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub notifications: Vec<NotificationSpec>,
}

/// 类型保留为原始字符串，未知类型照样渲染
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSpec {
    pub id: String,
    pub category: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    AddContainer {
        id: String,
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        notifications: Vec<NotificationSpec>,
    },
    AddNotification {
        container: String,
        id: String,
        category: String,
        text: String,
    },
    RemoveContainer {
        id: String,
    },
    Flush,
    Paint,
    Wait {
        ms: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub id: String,
    pub container: String,
    pub category: String,
    pub text: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: FilterStats,
    /// 被 Ctrl-C 等外部信号提前终止
    pub interrupted: bool,
    pub notifications: Vec<NotificationOutcome>,
}

impl ReplayReport {
    pub fn hidden(&self) -> impl Iterator<Item = &NotificationOutcome> {
        self.notifications.iter().filter(|n| n.hidden)
    }
}

struct Rendered {
    spec: NotificationSpec,
    container: String,
    node: Node,
}

/// 一次重放：文档、过滤器和按 id 索引的节点
pub struct Replay {
    document: Document,
    filter: NotificationFilter,
    config: FilterConfig,
    containers: HashMap<String, Node>,
    notifications: Vec<Rendered>,
}

impl Replay {
    /// 构建初始文档并组装过滤器（尚未启动）
    pub fn new(scenario: &Scenario, config: &FilterConfig) -> Result<Self> {
        let document = Document::new();
        let filter = NotificationFilter::new(&document, config)?;
        let mut replay = Self {
            document,
            filter,
            config: config.clone(),
            containers: HashMap::new(),
            notifications: Vec::new(),
        };
        for container in &scenario.containers {
            replay.add_container(&container.id, container.class.as_deref(), &container.notifications)?;
        }
        Ok(replay)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.filter.cancellation_token()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// 启动过滤器并依次执行步骤；token 被取消时提前结束
    pub async fn run(mut self, steps: &[Step]) -> Result<ReplayReport> {
        let cancel = self.cancellation_token();
        let started_at = Utc::now();
        self.filter.start();

        for (index, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(step = index, "replay interrupted");
                break;
            }
            debug!(step = index, ?step, "replay step");
            self.apply(step, &cancel)
                .await
                .with_context(|| format!("step {} failed", index))?;
        }

        self.document.run_until_idle();
        let interrupted = cancel.is_cancelled();
        self.filter.stop();

        Ok(ReplayReport {
            started_at,
            finished_at: Utc::now(),
            stats: self.filter.stats(),
            interrupted,
            notifications: self
                .notifications
                .into_iter()
                .map(|rendered| NotificationOutcome {
                    hidden: is_suppressed(&rendered.node),
                    id: rendered.spec.id,
                    container: rendered.container,
                    category: rendered.spec.category,
                    text: rendered.spec.text,
                })
                .collect(),
        })
    }

    async fn apply(&mut self, step: &Step, cancel: &CancellationToken) -> Result<()> {
        match step {
            Step::AddContainer {
                id,
                class,
                notifications,
            } => self.add_container(id, class.as_deref(), notifications)?,
            Step::AddNotification {
                container,
                id,
                category,
                text,
            } => {
                let spec = NotificationSpec {
                    id: id.clone(),
                    category: category.clone(),
                    text: text.clone(),
                };
                self.add_notification(container, &spec)?;
            }
            Step::RemoveContainer { id } => {
                let container = self
                    .containers
                    .get(id)
                    .ok_or_else(|| anyhow!("unknown container '{}'", id))?;
                container.remove();
            }
            Step::Flush => self.document.perform_microtask_checkpoint(),
            Step::Paint => {
                self.document.perform_microtask_checkpoint();
                self.document.render_frame();
            }
            Step::Wait { ms } => {
                // 等待前先结束当前任务
                self.document.perform_microtask_checkpoint();
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(*ms)) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
        Ok(())
    }

    fn add_container(
        &mut self,
        id: &str,
        class: Option<&str>,
        notifications: &[NotificationSpec],
    ) -> Result<()> {
        if self.containers.contains_key(id) {
            bail!("duplicate container id '{}'", id);
        }
        let class = class.unwrap_or(&self.config.container_class);
        let container = self.document.create_element("div").with_classes(&[class]);
        // 先在游离状态下填充，插入时一次带上完整内容
        self.containers.insert(id.to_string(), container.clone());
        for spec in notifications {
            self.add_notification(id, spec)?;
        }
        self.document.body().append_child(&container)?;
        Ok(())
    }

    fn add_notification(&mut self, container_id: &str, spec: &NotificationSpec) -> Result<()> {
        if self.notifications.iter().any(|n| n.spec.id == spec.id) {
            bail!("duplicate notification id '{}'", spec.id);
        }
        let container = self
            .containers
            .get(container_id)
            .ok_or_else(|| anyhow!("unknown container '{}'", container_id))?;
        let node = self.render_notification(spec)?;
        container.append_child(&node)?;
        self.notifications.push(Rendered {
            spec: spec.clone(),
            container: container_id.to_string(),
            node,
        });
        Ok(())
    }

    /// notistack 结构：外层元素 > 内容元素（带类型标记）> 消息元素 > 文本
    fn render_notification(&self, spec: &NotificationSpec) -> Result<Node> {
        let content_class = &self.config.content_class;
        let marker = format!("{}-{}", content_class, spec.category);
        let element = self.document.create_element("div");
        let content = self
            .document
            .create_element("div")
            .with_classes(&[content_class.as_str(), marker.as_str()]);
        let message = self.document.create_element("div");
        message.append_child(&self.document.create_text(&spec.text))?;
        content.append_child(&message)?;
        element.append_child(&content)?;
        Ok(element)
    }
}

/// 处理 replay 命令
pub async fn handle_replay(args: ReplayArgs) -> Result<()> {
    let config = FilterConfig::resolve(args.config.as_deref())?;
    let scenario = Scenario::load(&args.scenario)?;
    info!(
        scenario = %args.scenario.display(),
        rule = %config.rule.describe(),
        "replaying scenario"
    );

    let replay = Replay::new(&scenario, &config)?;
    let cancel = replay.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = replay.run(&scenario.steps).await;
    ctrl_c.abort();
    let report = report?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for outcome in report.hidden() {
        println!(
            "hidden  [{}] {} ({}): {}",
            outcome.category, outcome.id, outcome.container, outcome.text
        );
    }
    let elapsed = report.finished_at - report.started_at;
    println!(
        "\n{} container(s) watched, {} element(s) examined, {} hidden ({} ms)",
        report.stats.containers_attached,
        report.stats.elements_examined,
        report.stats.elements_suppressed,
        elapsed.num_milliseconds()
    );
    if report.interrupted {
        println!("(interrupted)");
    }
    Ok(())
}
