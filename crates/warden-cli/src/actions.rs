//! Action type definitions for CLI commands.

use clap::Subcommand;

/// Token actions.
#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Mint a token for a plugin and tenant
    Issue {
        /// Plugin identifier
        #[arg(long)]
        plugin: String,

        /// Tenant identifier
        #[arg(long)]
        tenant: String,
    },

    /// Verify a token's signature and validity window
    ///
    /// Nonces are only remembered for the lifetime of this process, so replay
    /// across separate invocations is not detected here.
    Verify {
        /// Token, or a full `Bearer <token>` header value
        token: String,
    },
}
