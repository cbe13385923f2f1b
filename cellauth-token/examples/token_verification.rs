use cellauth_token::{
    account_subject, decode_segment, decode_token, encode_segment, mint_token, CellKeyPair,
    CellPublicKey, Claims, ParseError, Role, Token, TokenTimeConfig,
};

fn main() -> Result<(), ParseError> {
    let cell_a = "https://example.com/cellA/";
    let cell_b = "https://example.com/cellB/";
    let key_a = CellKeyPair::generate();
    let key_b = CellKeyPair::generate();

    let claims = Claims::new_with_time(
        cell_a,
        account_subject(cell_a, "user001"),
        TokenTimeConfig::with_duration(600),
    )
    .with_roles([Role::new(cell_a, None, "roleX").url()]);

    // Example 1: Local access token, only usable at its issuer
    println!("Example 1: Local access token");
    let local = mint_token(&Token::local_access(claims.clone()), &key_a);
    let decoded = decode_token(&local, cell_a, &key_a.public())?;
    println!("✅ Accepted at {} for {}", cell_a, decoded.subject());

    match decode_token(&local, cell_b, &key_b.public()) {
        Err(e) => println!("✅ Rejected at {}: {}\n", cell_b, e),
        Ok(_) => println!("❌ Local token accepted at a foreign cell\n"),
    }

    // Example 2: Trans-cell access token, verified with the issuer's public key
    println!("Example 2: Trans-cell access token");
    let trans = mint_token(&Token::trans_cell_access(claims, cell_b), &key_a);
    let public_key_a = key_a.public().to_string();
    println!("Issuer public key: {}", public_key_a);

    let verifier = public_key_a
        .parse::<CellPublicKey>()
        .map_err(|e| ParseError::malformed(e.to_string()))?;
    let decoded = decode_token(&trans, cell_b, &verifier)?;
    println!(
        "✅ Accepted at {} with roles {:?}",
        decoded.audience().unwrap_or_default(),
        decoded.roles()
    );

    // Example 3: Tampering is detected
    println!("\nExample 3: Tampered token");
    let (body, seal) = trans.rsplit_once('.').unwrap_or_default();
    let mut seal = decode_segment(seal)?;
    seal[0] ^= 0x01;
    let tampered = format!("{}.{}", body, encode_segment(&seal));
    match decode_token(&tampered, cell_b, &verifier) {
        Err(e) => println!("✅ Rejected: {}", e),
        Ok(_) => println!("❌ Tampered token accepted"),
    }

    Ok(())
}
