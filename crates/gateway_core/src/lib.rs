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

//! The bidirectional translation pipeline between an OpenAI-compatible chat
//! surface and a proprietary multi-agent upstream: history reordering, tool
//! schema sanitization, request packet assembly, streaming, and SSE
//! translation.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod events;
pub mod model;
pub mod packet;
pub mod reorder;
pub mod schema_sanitizer;
pub mod server_message_data;
pub mod session;
pub mod settings;
pub mod translate;
pub mod upstream;

pub use error::GatewayError;
