//! Channel membership, mode and permission tests

mod common;

use common::TestServer;

#[tokio::test]
async fn test_join_creates_channel_with_creator_as_operator() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    ts.register(&mut alice, "alice").await;

    ts.send(&alice, "JOIN #foo").await;
    let lines = alice.drain();
    assert_eq!(lines[0], ":alice!alice@127.0.0.1 JOIN :#foo");
    assert_eq!(lines[1], ":oxircd.local 331 alice #foo :No topic is set");
    assert_eq!(lines[2], ":oxircd.local 353 alice = #foo :@alice");
    assert_eq!(lines[3], ":oxircd.local 366 alice #foo :End of /NAMES list");

    let channel = ts.server.channel("#foo").unwrap();
    assert!(channel.is_operator(&alice.id));
    assert_eq!(channel.member_count(), 1);
}

#[tokio::test]
async fn test_join_broadcast_and_names_order() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    alice.drain();

    ts.send(&bob, "JOIN #foo").await;
    assert_eq!(alice.drain(), vec![":bob!bob@127.0.0.1 JOIN :#foo"]);

    let lines = bob.drain();
    assert_eq!(lines[0], ":bob!bob@127.0.0.1 JOIN :#foo");
    assert_eq!(lines[2], ":oxircd.local 353 bob = #foo :@alice bob");
    assert_eq!(lines[3], ":oxircd.local 366 bob #foo :End of /NAMES list");
}

#[tokio::test]
async fn test_rejoin_is_a_no_op() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&bob, "JOIN #foo").await;
    assert!(bob.drain().is_empty());
    assert!(alice.drain().is_empty());
    assert_eq!(ts.server.channel("#foo").unwrap().member_count(), 2);
}

#[tokio::test]
async fn test_invalid_channel_name_yields_403() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    ts.register(&mut alice, "alice").await;

    ts.send(&alice, "JOIN foo").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 403 alice foo :No such channel"]
    );
}

#[tokio::test]
async fn test_key_enforcement() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut carol = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut carol, "carol").await;

    ts.send(&alice, "JOIN #foo").await;
    alice.drain();
    ts.send(&alice, "MODE #foo +k hunter2").await;
    assert_eq!(
        alice.drain(),
        vec![":alice!alice@127.0.0.1 MODE #foo +k hunter2"]
    );

    ts.send(&carol, "JOIN #foo").await;
    assert_eq!(
        carol.drain(),
        vec![":oxircd.local 475 carol #foo :Cannot join channel (+k)"]
    );

    ts.send(&carol, "JOIN #foo hunter2").await;
    let lines = carol.drain();
    assert_eq!(lines[0], ":carol!carol@127.0.0.1 JOIN :#foo");
    assert!(ts.server.channel("#foo").unwrap().has_member(&carol.id));
}

#[tokio::test]
async fn test_invite_only_flow() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #priv").await;
    alice.drain();
    ts.send(&alice, "MODE #priv +i").await;
    alice.drain();

    ts.send(&bob, "JOIN #priv").await;
    assert_eq!(
        bob.drain(),
        vec![":oxircd.local 473 bob #priv :Cannot join channel (+i)"]
    );

    ts.send(&alice, "INVITE bob #priv").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 341 alice bob #priv"]
    );
    assert_eq!(
        bob.drain(),
        vec![":alice!alice@127.0.0.1 INVITE bob :#priv"]
    );

    ts.send(&bob, "JOIN #priv").await;
    let lines = bob.drain();
    assert_eq!(lines[0], ":bob!bob@127.0.0.1 JOIN :#priv");

    // The invite is consumed on join
    assert!(!ts.server.channel("#priv").unwrap().is_invited("bob"));
}

#[tokio::test]
async fn test_invite_errors() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&alice, "INVITE ghost #foo").await;
    assert_eq!(alice.drain_codes(), vec!["401"]);

    ts.send(&alice, "INVITE bob #nowhere").await;
    assert_eq!(alice.drain_codes(), vec!["403"]);

    ts.send(&alice, "INVITE bob #foo").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 443 alice bob #foo :is already on channel"]
    );

    // A non-member cannot invite, and on +i a non-op cannot either
    let mut carol = ts.connect();
    ts.register(&mut carol, "carol").await;
    ts.send(&carol, "INVITE bob #foo").await;
    assert_eq!(carol.drain_codes(), vec!["442"]);

    ts.send(&alice, "MODE #foo +i").await;
    alice.drain();
    bob.drain();
    let mut dave = ts.connect();
    ts.register(&mut dave, "dave").await;
    ts.send(&bob, "INVITE dave #foo").await;
    assert_eq!(bob.drain_codes(), vec!["482"]);
}

#[tokio::test]
async fn test_user_limit_enforcement() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #small").await;
    alice.drain();
    ts.send(&alice, "MODE #small +l 1").await;
    alice.drain();

    ts.send(&bob, "JOIN #small").await;
    assert_eq!(
        bob.drain(),
        vec![":oxircd.local 471 bob #small :Cannot join channel (+l)"]
    );

    ts.send(&alice, "MODE #small -l").await;
    alice.drain();
    ts.send(&bob, "JOIN #small").await;
    assert!(ts.server.channel("#small").unwrap().has_member(&bob.id));
}

#[tokio::test]
async fn test_mode_query_and_net_change_broadcast() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    // A single command accumulates one broadcast with ordered parameters
    ts.send(&alice, "MODE #foo +ik secret").await;
    let change = ":alice!alice@127.0.0.1 MODE #foo +ik secret";
    assert_eq!(alice.drain(), vec![change]);
    assert_eq!(bob.drain(), vec![change]);

    ts.send(&alice, "MODE #foo").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 324 alice #foo +ik secret"]
    );

    // Setting +i again flips nothing and still nets a single broadcast
    ts.send(&alice, "MODE #foo +i").await;
    assert_eq!(alice.drain(), vec![":alice!alice@127.0.0.1 MODE #foo +i"]);
    let channel = ts.server.channel("#foo").unwrap();
    assert!(channel.has_mode('i'));

    // Mixed signs come out in order
    ts.send(&alice, "MODE #foo -i+t").await;
    assert_eq!(alice.drain(), vec![":alice!alice@127.0.0.1 MODE #foo -i+t"]);
}

#[tokio::test]
async fn test_mode_requires_chanop() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&bob, "MODE #foo +i").await;
    assert_eq!(
        bob.drain(),
        vec![":oxircd.local 482 bob #foo :You're not channel operator"]
    );

    // Viewing modes needs no privileges
    ts.send(&bob, "MODE #foo").await;
    assert_eq!(bob.drain(), vec![":oxircd.local 324 bob #foo +"]);
}

#[tokio::test]
async fn test_mode_o_grants_and_revokes_chanop() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&alice, "MODE #foo +o bob").await;
    let change = ":alice!alice@127.0.0.1 MODE #foo +o bob";
    assert_eq!(alice.drain(), vec![change]);
    assert_eq!(bob.drain(), vec![change]);
    assert!(ts.server.channel("#foo").unwrap().is_operator(&bob.id));

    ts.send(&alice, "MODE #foo -o bob").await;
    alice.drain();
    bob.drain();
    assert!(!ts.server.channel("#foo").unwrap().is_operator(&bob.id));

    ts.send(&alice, "MODE #foo +o ghost").await;
    assert_eq!(alice.drain_codes(), vec!["401"]);

    let mut carol = ts.connect();
    ts.register(&mut carol, "carol").await;
    ts.send(&alice, "MODE #foo +o carol").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 441 alice carol #foo :They aren't on that channel"]
    );
}

#[tokio::test]
async fn test_unknown_mode_char_yields_472() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.send(&alice, "JOIN #foo").await;
    alice.drain();

    ts.send(&alice, "MODE #foo +x").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 472 alice x :is unknown mode char to me"]
    );
}

#[tokio::test]
async fn test_user_mode_contract() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "MODE bob +o").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 502 alice :Cannot change mode for other users"]
    );

    ts.send(&alice, "MODE alice").await;
    assert_eq!(alice.drain(), vec![":oxircd.local 221 alice +"]);

    ts.send(&alice, "MODE alice +o").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 501 alice :Cannot set user mode +o"]
    );
}

#[tokio::test]
async fn test_topic_query_set_and_lock() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&alice, "TOPIC #foo").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 331 alice #foo :No topic is set"]
    );

    // Without +t anyone on the channel may set the topic
    ts.send(&bob, "TOPIC #foo :general chatter").await;
    let change = ":bob!bob@127.0.0.1 TOPIC #foo :general chatter";
    assert_eq!(alice.drain(), vec![change]);
    assert_eq!(bob.drain(), vec![change]);

    ts.send(&bob, "TOPIC #foo").await;
    assert_eq!(
        bob.drain(),
        vec![":oxircd.local 332 bob #foo :general chatter"]
    );

    // Joining now reports the topic with 332
    let mut carol = ts.connect();
    ts.register(&mut carol, "carol").await;
    ts.send(&carol, "JOIN #foo").await;
    let lines = carol.drain();
    assert_eq!(lines[1], ":oxircd.local 332 carol #foo :general chatter");
    alice.drain();
    bob.drain();

    // With +t only operators may change it
    ts.send(&alice, "MODE #foo +t").await;
    alice.drain();
    bob.drain();
    carol.drain();
    ts.send(&bob, "TOPIC #foo :hijacked").await;
    assert_eq!(
        bob.drain(),
        vec![":oxircd.local 482 bob #foo :You're not channel operator"]
    );

    ts.send(&alice, "TOPIC #foo :official topic").await;
    assert_eq!(
        bob.drain(),
        vec![":alice!alice@127.0.0.1 TOPIC #foo :official topic"]
    );
}

#[tokio::test]
async fn test_part_and_channel_deletion() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "PART #foo").await;
    assert_eq!(alice.drain_codes(), vec!["403"]);

    ts.send(&alice, "JOIN #foo").await;
    alice.drain();
    ts.send(&bob, "PART #foo").await;
    assert_eq!(
        bob.drain(),
        vec![":oxircd.local 442 bob #foo :You're not on that channel"]
    );

    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&bob, "PART #foo :gotta go").await;
    let part = ":bob!bob@127.0.0.1 PART #foo :gotta go";
    assert_eq!(alice.drain(), vec![part]);
    assert_eq!(bob.drain(), vec![part]);
    assert_eq!(ts.server.channel("#foo").unwrap().member_count(), 1);

    ts.send(&alice, "PART #foo").await;
    assert_eq!(alice.drain(), vec![":alice!alice@127.0.0.1 PART #foo :Leaving"]);
    assert!(ts.server.channel("#foo").is_none());
    assert_eq!(ts.server.channel_count(), 0);
}

#[tokio::test]
async fn test_kick_contract() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();
    bob.drain();

    ts.send(&bob, "KICK #foo alice").await;
    assert_eq!(bob.drain_codes(), vec!["482"]);

    ts.send(&alice, "KICK #foo ghost").await;
    assert_eq!(alice.drain_codes(), vec!["401"]);

    let mut carol = ts.connect();
    ts.register(&mut carol, "carol").await;
    ts.send(&alice, "KICK #foo carol").await;
    assert_eq!(alice.drain_codes(), vec!["441"]);

    ts.send(&alice, "KICK #foo bob :flooding").await;
    let kick = ":alice!alice@127.0.0.1 KICK #foo bob :flooding";
    assert_eq!(alice.drain(), vec![kick]);
    assert_eq!(bob.drain(), vec![kick]);
    assert!(!ts.server.channel("#foo").unwrap().has_member(&bob.id));
    assert!(!ts.server.client(bob.id).unwrap().is_on_channel("#foo"));
}

#[tokio::test]
async fn test_names_and_list() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #foo").await;
    ts.send(&bob, "JOIN #foo").await;
    ts.send(&bob, "JOIN #bar").await;
    ts.send(&bob, "TOPIC #bar :barfly corner").await;
    alice.drain();
    bob.drain();

    ts.send(&alice, "NAMES #foo").await;
    assert_eq!(
        alice.drain(),
        vec![
            ":oxircd.local 353 alice = #foo :@alice bob",
            ":oxircd.local 366 alice #foo :End of /NAMES list",
        ]
    );

    ts.send(&alice, "NAMES").await;
    let lines = alice.drain();
    assert_eq!(
        lines,
        vec![
            ":oxircd.local 353 alice = #bar :@bob",
            ":oxircd.local 353 alice = #foo :@alice bob",
            ":oxircd.local 366 alice * :End of /NAMES list",
        ]
    );

    ts.send(&alice, "NAMES #nowhere").await;
    assert_eq!(
        alice.drain(),
        vec![":oxircd.local 366 alice #nowhere :End of /NAMES list"]
    );

    ts.send(&alice, "LIST").await;
    assert_eq!(
        alice.drain(),
        vec![
            ":oxircd.local 321 alice Channel :Users Name",
            ":oxircd.local 322 alice #bar 1 :barfly corner",
            ":oxircd.local 322 alice #foo 2 :",
            ":oxircd.local 323 alice :End of /LIST",
        ]
    );

    ts.send(&alice, "LIST #bar").await;
    assert_eq!(
        alice.drain(),
        vec![
            ":oxircd.local 321 alice Channel :Users Name",
            ":oxircd.local 322 alice #bar 1 :barfly corner",
            ":oxircd.local 323 alice :End of /LIST",
        ]
    );
}

#[tokio::test]
async fn test_membership_is_bidirectional() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    ts.register(&mut alice, "alice").await;

    ts.send(&alice, "JOIN #a,#b").await;
    alice.drain();

    let client = ts.server.client(alice.id).unwrap();
    assert!(client.is_on_channel("#a"));
    assert!(client.is_on_channel("#b"));
    assert!(ts.server.channel("#a").unwrap().has_member(&alice.id));
    assert!(ts.server.channel("#b").unwrap().has_member(&alice.id));

    ts.send(&alice, "PART #a").await;
    let client = ts.server.client(alice.id).unwrap();
    assert!(!client.is_on_channel("#a"));
    assert!(ts.server.channel("#a").is_none());
    assert!(ts.server.channel("#b").unwrap().has_member(&alice.id));
}

#[tokio::test]
async fn test_channel_names_fold_case() {
    let mut ts = TestServer::new();
    let mut alice = ts.connect();
    let mut bob = ts.connect();
    ts.register(&mut alice, "alice").await;
    ts.register(&mut bob, "bob").await;

    ts.send(&alice, "JOIN #Foo").await;
    ts.send(&bob, "JOIN #foo").await;
    alice.drain();

    // Original case is preserved in replies
    let lines = bob.drain();
    assert_eq!(lines[0], ":bob!bob@127.0.0.1 JOIN :#Foo");
    assert_eq!(ts.server.channel_count(), 1);
    assert_eq!(ts.server.channel("#FOO").unwrap().name, "#Foo");
}
