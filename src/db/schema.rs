use rusqlite::Connection;

/// Initialize the database schema.
///
/// Uniqueness constraints carry the idempotency guarantees: webhook dedupe,
/// one provider-transaction mirror row, one invoice per intent, one ownership
/// or grant per (account, item), one account per registration intent.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Payment intents (aggregate root). amount/currency are immutable
        -- after insert; verification must match them exactly.
        CREATE TABLE IF NOT EXISTS payment_intents (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL CHECK (provider IN ('mpesa', 'paystack', 'manual_transfer')),
            method TEXT NOT NULL,
            purpose TEXT NOT NULL CHECK (purpose IN (
                'signup_fee', 'product_purchase', 'product_subscription',
                'institution_subscription', 'document_purchase')),
            status TEXT NOT NULL CHECK (status IN (
                'pending', 'pending_approval', 'success', 'failed', 'cancelled')),
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            checkout_request_id TEXT,
            merchant_request_id TEXT,
            provider_reference TEXT,
            provider_transaction_id TEXT,
            provider_channel TEXT,
            provider_paid_at INTEGER,
            is_finalized INTEGER NOT NULL DEFAULT 0,
            invoice_id TEXT,
            failure_reason TEXT,
            admin_notes TEXT,
            approved_by TEXT,
            approved_at INTEGER,
            account_id TEXT REFERENCES accounts(id),
            institution_id TEXT REFERENCES institutions(id),
            registration_intent_id TEXT REFERENCES registration_intents(id),
            product_id TEXT REFERENCES content_products(id),
            document_id TEXT REFERENCES legal_documents(id),
            duration_months INTEGER,
            payer_contact TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_intents_provider_reference
            ON payment_intents(provider_reference) WHERE provider_reference IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_intents_checkout_request
            ON payment_intents(checkout_request_id) WHERE checkout_request_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_intents_status ON payment_intents(status);
        CREATE INDEX IF NOT EXISTS idx_intents_account ON payment_intents(account_id);

        -- Webhook events (append-only). dedupe_hash = sha256(provider || body),
        -- unique per provider: identical redeliveries collide here and stop.
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_type TEXT,
            reference TEXT,
            dedupe_hash TEXT NOT NULL,
            signature_valid INTEGER,
            processing_status TEXT NOT NULL CHECK (processing_status IN (
                'received', 'processed', 'failed', 'ignored')),
            processing_error TEXT,
            raw_body TEXT NOT NULL,
            received_at INTEGER NOT NULL,
            processed_at INTEGER,
            UNIQUE(provider, dedupe_hash)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_reference ON webhook_events(reference);

        -- Provider-side truth, one row per provider transaction.
        CREATE TABLE IF NOT EXISTS provider_transactions (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            provider_transaction_id TEXT NOT NULL,
            reference TEXT,
            status TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            channel TEXT,
            paid_at INTEGER,
            raw_payload TEXT NOT NULL,
            first_seen_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL,
            UNIQUE(provider, provider_transaction_id)
        );

        -- Invoice numbering: one mutable counter row per accounting period.
        -- Mutated only through a single atomic increment-and-return UPDATE.
        CREATE TABLE IF NOT EXISTS invoice_sequences (
            period TEXT PRIMARY KEY,
            last_number INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY,
            number TEXT NOT NULL UNIQUE,
            period TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'issued',
            account_id TEXT REFERENCES accounts(id),
            institution_id TEXT REFERENCES institutions(id),
            intent_id TEXT NOT NULL UNIQUE REFERENCES payment_intents(id),
            currency TEXT NOT NULL,
            net_cents INTEGER NOT NULL,
            tax_cents INTEGER NOT NULL,
            gross_cents INTEGER NOT NULL,
            issued_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invoice_lines (
            id TEXT PRIMARY KEY,
            invoice_id TEXT NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
            description TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            net_cents INTEGER NOT NULL,
            tax_cents INTEGER NOT NULL,
            gross_cents INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_invoice_lines_invoice ON invoice_lines(invoice_id);

        -- Institutions (seat capacity consumed as an opaque reservation)
        CREATE TABLE IF NOT EXISTS institutions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            seat_limit INTEGER NOT NULL DEFAULT 0,
            seats_reserved INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Subscriber accounts. registration_intent_id is unique so that
        -- completing the same registration twice is a no-op insert.
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            registration_intent_id TEXT UNIQUE REFERENCES registration_intents(id),
            institution_id TEXT REFERENCES institutions(id),
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS registration_intents (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            institution_id TEXT REFERENCES institutions(id),
            completed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            completed_at INTEGER
        );

        -- Bearer tokens for end-user auth on the confirm path.
        CREATE TABLE IF NOT EXISTS api_tokens (
            token_hash TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL
        );

        -- Catalog
        CREATE TABLE IF NOT EXISTS content_products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('one_time', 'subscription')),
            price_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS legal_documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Fulfillment targets. One window row per subject; purchases and
        -- grants are unique per (account, item) so re-finalization is inert.
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL UNIQUE REFERENCES accounts(id),
            product_id TEXT REFERENCES content_products(id),
            starts_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS institution_subscriptions (
            id TEXT PRIMARY KEY,
            institution_id TEXT NOT NULL UNIQUE REFERENCES institutions(id),
            starts_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS product_ownerships (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            product_id TEXT NOT NULL REFERENCES content_products(id),
            source_intent_id TEXT NOT NULL REFERENCES payment_intents(id),
            created_at INTEGER NOT NULL,
            UNIQUE(account_id, product_id)
        );

        CREATE TABLE IF NOT EXISTS document_grants (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            document_id TEXT NOT NULL REFERENCES legal_documents(id),
            source_intent_id TEXT NOT NULL REFERENCES payment_intents(id),
            created_at INTEGER NOT NULL,
            UNIQUE(account_id, document_id)
        );
        "#,
    )
}
