// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log transports that feed a [`crate::StreamCoordinator`].

pub mod websocket;
