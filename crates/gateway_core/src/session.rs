/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The process-global `SessionState` cell (§3, §9 "Process-global
//! SessionState"): a single-writer-per-field hint carried opportunistically
//! across turns, mirroring the `Lazy<RwLock<...>>` pattern
//! `edgen_core::settings::SETTINGS` uses for its own process-global cell.

use futures::stream::BoxStream;
use futures::StreamExt;
use once_cell::sync::Lazy;
use tokio::sync::RwLock;

use crate::error::GatewayError;
use crate::events::UpstreamEvent;
use crate::model::SessionState;

/// The process-global session correlator. Not required for the correctness
/// of a single turn; read when building subsequent packets and written
/// opportunistically from upstream `init` events.
pub static SESSION: Lazy<RwLock<SessionState>> = Lazy::new(|| RwLock::new(SessionState::default()));

/// Take a snapshot of the current session hint. Reads are never blocked by
/// readers elsewhere; this is a cheap clone of two `Option<String>`s.
pub async fn snapshot() -> SessionState {
    SESSION.read().await.clone()
}

/// Record a conversation id observed on an upstream `init` event.
/// Last-writer-wins, per §5's shared-resource policy.
pub async fn record_conversation_id(conversation_id: String) {
    SESSION.write().await.conversation_id = Some(conversation_id);
}

/// Record a task id observed on an upstream `init` event, to be reused as
/// the baseline for the next turn's packet.
pub async fn record_baseline_task_id(task_id: String) {
    SESSION.write().await.baseline_task_id = Some(task_id);
}

/// Wrap an upstream event stream so that every `init` event observed along
/// the way is recorded into the process-global [`SESSION`] cell before
/// being passed through unchanged to the caller (§5: "SessionState is
/// updated only by the streamer on `init` events"). A cancelled request
/// (the stream dropped before completion) simply stops recording; there is
/// no partial mutation beyond whatever `init` events had already arrived.
pub fn observe(
    events: BoxStream<'static, Result<UpstreamEvent, GatewayError>>,
) -> BoxStream<'static, Result<UpstreamEvent, GatewayError>> {
    Box::pin(events.then(|item| async move {
        if let Ok(UpstreamEvent::Init {
            conversation_id,
            task_id,
        }) = &item
        {
            if let Some(cid) = conversation_id.clone() {
                record_conversation_id(cid).await;
            }
            if let Some(tid) = task_id.clone() {
                record_baseline_task_id(tid).await;
            }
        }
        item
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_writes() {
        record_conversation_id("conv-1".to_string()).await;
        record_baseline_task_id("task-1".to_string()).await;
        let snap = snapshot().await;
        assert_eq!(snap.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(snap.baseline_task_id.as_deref(), Some("task-1"));
    }

    #[tokio::test]
    async fn observe_records_init_event_and_passes_it_through() {
        let events: BoxStream<'static, Result<UpstreamEvent, GatewayError>> = Box::pin(futures::stream::iter(vec![
            Ok(UpstreamEvent::Init {
                conversation_id: Some("conv-obs".to_string()),
                task_id: Some("task-obs".to_string()),
            }),
        ]));
        let mut observed = observe(events);
        let first = observed.next().await.unwrap().unwrap();
        assert_eq!(
            first,
            UpstreamEvent::Init {
                conversation_id: Some("conv-obs".to_string()),
                task_id: Some("task-obs".to_string())
            }
        );
        let snap = snapshot().await;
        assert_eq!(snap.conversation_id.as_deref(), Some("conv-obs"));
    }
}
